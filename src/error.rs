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

//! Errors raised while locating and joining control groups.
//!
//! Nothing here is recovered from locally. Callers are expected to hand the
//! error to a single top-level handler which prints it and exits.

use nix::errno::Errno;
use snafu::prelude::*;
pub(crate) use snafu::{ensure, OptionExt, ResultExt};
use std::path::PathBuf;

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
	#[snafu(display("cannot statfs {}", path.display()))]
	Statfs { path: PathBuf, source: Errno },

	#[snafu(display("cannot open {}", path.display()))]
	OpenReport { path: PathBuf, source: std::io::Error },

	#[snafu(display("cannot read subsequent line from {}", path.display()))]
	ReadReport { path: PathBuf, source: std::io::Error },

	#[snafu(display("cannot parse cgroup, expected {}: {}", expected, line))]
	MalformedRecord { expected: &'static str, line: String },

	#[snafu(display("cannot find unified cgroup path in {}", path.display()))]
	UnifiedPathNotFound { path: PathBuf },

	#[snafu(display("path too long: {}", path))]
	PathTooLong { path: String },

	#[snafu(display("invalid cgroup name {:?}", name))]
	InvalidName { name: String },

	#[snafu(display("cannot open cgroup hierarchy {}", path.display()))]
	OpenHierarchy { path: PathBuf, source: Errno },

	#[snafu(display("cannot create cgroup hierarchy {}", path.display()))]
	CreateHierarchy { path: PathBuf, source: Errno },

	#[snafu(display("cannot change owner of cgroup hierarchy {} to root.root", path.display()))]
	ChownHierarchy { path: PathBuf, source: Errno },

	#[snafu(display("cannot open file {}", path.display()))]
	OpenProcs { path: PathBuf, source: Errno },

	#[snafu(display("cannot move process {} to cgroup hierarchy {}", pid, path.display()))]
	WriteProcs {
		pid: i32,
		path: PathBuf,
		source: std::io::Error,
	},

	#[snafu(display(
		"cannot move process {} to cgroup hierarchy {} (wrote {} of {} bytes)",
		pid,
		path.display(),
		written,
		expected
	))]
	ShortWrite {
		pid: i32,
		path: PathBuf,
		written: usize,
		expected: usize,
	},
}

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// The environment did not cooperate: missing paths, permissions, descriptors.
	Environment,
	/// The per-process cgroup report did not have the expected shape.
	Format,
	/// Everything was readable but the result makes no sense.
	Logical,
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::MalformedRecord { .. } => ErrorKind::Format,
			Error::UnifiedPathNotFound { .. } | Error::ShortWrite { .. } | Error::InvalidName { .. } => {
				ErrorKind::Logical
			}
			_ => ErrorKind::Environment,
		}
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
