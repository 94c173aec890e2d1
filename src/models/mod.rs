pub mod activity;
pub mod booking;
pub mod favorite;
pub mod user;

pub use activity::Activity;
pub use booking::{Booking, BookingStatus};
pub use favorite::{Favorite, FavoriteIds, ItemType};
pub use user::CurrentUser;
