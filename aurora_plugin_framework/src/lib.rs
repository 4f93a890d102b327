pub mod event_emitter;
pub mod keep_alive;
pub mod plugin;

pub use event_emitter::{
	BusMessage,
	DeclareEventError,
	Event,
	EventEmitter,
	EventReceiver,
	FilterCriteria,
	RegisterListenerError,
};
pub use keep_alive::KeepAlive;
pub use plugin::{
	PluginContext,
	PluginManager,
	RegisterPluginError,
};

#[cfg(test)]
mod tests;

/// Formats a message and logs it through a `PluginContext` at the default level.
#[macro_export]
macro_rules! log {
	($ctx:expr, $($arg:tt)*) => {
		$ctx.log(::std::format!($($arg)*)).await
	};
}

/// Formats a message and logs it through a `PluginContext` at debug level.
#[macro_export]
macro_rules! log_debug {
	($ctx:expr, $($arg:tt)*) => {
		$ctx.log_debug(::std::format!($($arg)*)).await
	};
}

/// Formats a message and logs it through a `PluginContext` at warning level.
#[macro_export]
macro_rules! log_warn {
	($ctx:expr, $($arg:tt)*) => {
		$ctx.log_warn(::std::format!($($arg)*)).await
	};
}

/// Formats a message and logs it through a `PluginContext` at error level.
#[macro_export]
macro_rules! log_error {
	($ctx:expr, $($arg:tt)*) => {
		$ctx.log_error(::std::format!($($arg)*)).await
	};
}
