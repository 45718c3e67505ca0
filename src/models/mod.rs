pub mod poll;

pub use poll::{CreatePollRequest, Poll, PollRow, PollType};
