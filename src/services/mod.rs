pub mod availability_service;
pub mod booking_service;
pub mod cross_tab_signal;
pub mod event_bus;
pub mod favorites_service;
pub mod lifecycle_service;
pub mod list_pipeline;
pub mod marketplace_api;
pub mod view_reconciler;
