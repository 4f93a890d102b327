use aurora_plugin_framework::*;

/// Initialize the core plugin.
///
/// Declares the log events every other plugin emits through its context, so
/// listeners attaching later (status UI, network log sinks) find them typed.
pub async fn initialize(plugin_context: PluginContext) {
	plugin_context
		.declare_event::<String>(
			"log".into(),
			Some("A log message somewhere useful".into()),
		)
		.await
		.unwrap();

	plugin_context
		.declare_event::<String>(
			"log_debug".into(),
			Some("A log message for development and troubleshooting".into()),
		)
		.await
		.unwrap();

	plugin_context
		.declare_event::<String>(
			"log_warn".into(),
			Some("A log message about something that degraded gracefully".into()),
		)
		.await
		.unwrap();

	plugin_context
		.declare_event::<String>(
			"log_error".into(),
			Some("A log message about an error that needs to be addressed".into()),
		)
		.await
		.unwrap();
}
