mod intent;
mod logging;
mod scenes;
mod session_runner;

pub use intent::Intent;
pub use logging::init_logging;
pub use scenes::{GameSessionScene, HudScene, HudState, HudView, NotificationScene, Notices};
pub use session_runner::{Outcome, SessionRunner};
