pub mod callback;
pub mod flow;
pub mod token;

pub use callback::{CallbackListener, QueryParams};
pub use flow::{Authorizer, BrowserLauncher, SystemBrowser};
pub use token::{exchange_code, refresh_token, TokenData};
