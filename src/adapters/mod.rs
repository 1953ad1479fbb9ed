pub mod odds_api;
pub mod webdriver;

pub use odds_api::HttpOddsFeed;
pub use webdriver::{WebDriverClient, WebDriverSession};
