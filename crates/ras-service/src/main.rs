//! Main entry point for the resource allocation service.
//!
//! Each configuration file passed on the command line starts one provider.
//! Providers started by the same process and configured with the loopback
//! transport federate with each other through the process-wide hub.

use clap::Parser;
use ras_config::Config;
use ras_core::{RasBuilder, RasEngine, RasFactories};
use ras_transport::implementations::loopback::LoopbackHub;
use std::path::PathBuf;

use ras_cloud::implementations::simulated::create_cloud as create_simulated_cloud;
use ras_storage::implementations::file::create_storage as create_file_storage;
use ras_storage::implementations::memory::create_storage as create_memory_storage;
use ras_transport::implementations::loopback::create_transport as create_loopback_transport;

/// Command-line arguments for the service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to a provider configuration file; repeat to run several providers
	#[arg(short, long, default_value = "config.toml", num_args = 1..)]
	config: Vec<PathBuf>,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info", env = "RAS_LOG_LEVEL")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	// RUST_LOG wins over --log-level
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started resource allocation service");

	let mut engines = Vec::new();
	for path in &args.config {
		let config = Config::from_file(&path.to_string_lossy()).await?;
		tracing::info!("Loaded configuration [{}]", config.provider.id);
		engines.push(build_engine(config).await?);
	}

	futures::future::try_join_all(engines.iter().map(|engine| engine.run())).await?;

	tracing::info!("Stopped resource allocation service");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($factory_type:ty, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert($name.to_string(), $factory as $factory_type);
        )*
        factories
    }};
}

/// Builds a provider with every compiled-in implementation and attaches it
/// to the loopback hub when that is its transport.
async fn build_engine(config: Config) -> Result<RasEngine, Box<dyn std::error::Error>> {
	let loopback = config.transport.primary == "loopback";

	let factories = RasFactories {
		storage_factories: create_factory_map!(
			ras_storage::StorageFactory,
			"file" => create_file_storage,
			"memory" => create_memory_storage,
		),
		cloud_factories: create_factory_map!(
			ras_cloud::CloudFactory,
			"simulated" => create_simulated_cloud,
		),
		transport_factories: create_factory_map!(
			ras_transport::TransportFactory,
			"loopback" => create_loopback_transport,
		),
	};

	let engine = RasBuilder::new(config).build(factories).await?;
	if loopback {
		LoopbackHub::global().register(engine.provider_id(), &engine.federation());
	}
	Ok(engine)
}
