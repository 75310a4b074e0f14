mod auction;
mod bid;
mod notification;

pub use {
    auction::*,
    bid::*,
    notification::*,
};
