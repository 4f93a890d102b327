pub mod init;
pub mod led_utils;
pub mod plugins;
pub mod utilities;

pub use async_std;
pub use aurora_plugin_framework::*;
pub use init::async_main;
