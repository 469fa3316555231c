pub mod booking;
pub mod flight;
pub mod seat;
pub mod user;

pub use booking::{Booking, BookingDetails, BookingStatus, NewBooking};
pub use flight::Flight;
pub use seat::{Seat, SeatClass};
pub use user::User;
