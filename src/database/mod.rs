pub mod signal_repo;
