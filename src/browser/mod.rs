mod screenshots;
mod uploader;
mod webdriver;

pub use screenshots::{DEFAULT_KEEP, ScreenshotArchive};
pub use uploader::{IDENTIFIER_FIELD_XPATH, LibraryUploader};
pub use webdriver::{BrowserError, BrowserOptions, By, WebDriver};
