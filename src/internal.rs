// Copyright 2026 Octave Online LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Glue shared by the binaries.

use crate::Error;
use std::error::Error as _;
use std::process;

/// Environment variable holding an env_logger filter, e.g. `cg2join=debug`.
pub const LOG_ENV: &str = "CG2JOIN_LOG";

/// Logs to stderr. `verbose` lowers the default level from warn to debug;
/// `CG2JOIN_LOG` wins over both.
pub fn init_logging(verbose: bool) {
	let default = if verbose { "debug" } else { "warn" };
	env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, default))
		.format_timestamp(None)
		.format_target(false)
		.init();
}

/// The error followed by each of its causes, `: `-separated.
pub fn describe(err: &Error) -> String {
	let mut msg = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		msg.push_str(": ");
		msg.push_str(&cause.to_string());
		source = cause.source();
	}
	msg
}

/// Prints the error with its causes and exits with status 1.
pub fn die(err: &Error) -> ! {
	eprintln!("{}: {}", env!("CARGO_PKG_NAME"), describe(err));
	process::exit(1)
}
