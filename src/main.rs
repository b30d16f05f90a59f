use clap::Command;
use std::process::ExitCode;
use tokio::io::BufReader;

use gcsannex::error::RemoteError;
use gcsannex::logging::*;
use gcsannex::protocol::Channel;
use gcsannex::relay::{relay_failure, GENERIC_FAILURE};
use gcsannex::{serve, LocalConnector, Remote, RemoteConfig};

/// Tell the host why we cannot even start. It still expects the version
/// announcement before anything else.
async fn report_startup_error(err: &RemoteError) {
	let mut chan = Channel::new(tokio::io::empty(), tokio::io::stdout());
	let reported = match chan.send_version().await {
		Ok(()) => relay_failure(&mut chan, GENERIC_FAILURE, &[], err).await,
		Err(e) => Err(e),
	};
	if let Err(e) = reported {
		error!("Cannot report startup error: {}", e);
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	Command::new("gcsannex")
		.version(env!("CARGO_PKG_VERSION"))
		.about("git-annex special remote for Google Cloud Storage")
		.after_help("Started by git-annex; speaks the external special remote protocol on stdin/stdout.")
		.get_matches();

	gcsannex::logging::init_tracing();

	let config = match RemoteConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("{}", e);
			report_startup_error(&e).await;
			return ExitCode::FAILURE;
		}
	};

	let connector = LocalConnector::new(config.store_root.clone());
	let mut remote =
		Remote::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), config, Box::new(connector));

	match serve(&mut remote).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			debug!("Exiting after: {}", e);
			ExitCode::FAILURE
		}
	}
}

// vim: ts=4
