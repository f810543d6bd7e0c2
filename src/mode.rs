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

//! Detection of the cgroup layout the kernel is using.

use crate::error::*;
use nix::errno::Errno;
use nix::libc;
use nix::sys::statfs::{statfs, FsType};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(target_env = "musl")]
type FsTypeT = libc::c_ulong;

#[cfg(not(target_env = "musl"))]
type FsTypeT = libc::c_long;

/// Where cgroupfs is mounted.
pub const CG_BASE_DIR: &str = "/sys/fs/cgroup";

/// Where the unified hierarchy is mounted next to the v1 ones in hybrid mode.
pub const CG_UNIFIED_DIR: &str = "/sys/fs/cgroup/unified";

static GLOBAL: ModeDetector = ModeDetector::new();

/// How control groups are organized on this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupMode {
	/// Only v1 hierarchies, or v1 with the unified hierarchy mounted alongside.
	LegacyOrHybrid,
	/// Everything lives in the single v2 hierarchy at the cgroupfs root.
	Unified,
}

impl CgroupMode {
	pub fn from_fs_type(fs_type: FsType) -> Self {
		if fs_type == FsType(libc::CGROUP2_SUPER_MAGIC as FsTypeT) {
			CgroupMode::Unified
		} else {
			CgroupMode::LegacyOrHybrid
		}
	}

	/// Directory under which paths reported with hierarchy id 0 are found.
	///
	/// This is the conventional location and is not checked against the mount
	/// table.
	pub fn root(self) -> &'static Path {
		match self {
			CgroupMode::Unified => Path::new(CG_BASE_DIR),
			CgroupMode::LegacyOrHybrid => Path::new(CG_UNIFIED_DIR),
		}
	}
}

impl fmt::Display for CgroupMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CgroupMode::Unified => f.write_str("unified"),
			CgroupMode::LegacyOrHybrid => f.write_str("legacy-or-hybrid"),
		}
	}
}

/// Probes the cgroupfs mount point with statfs(2).
///
/// The first time the unified layout is seen a warning is logged that only
/// partial confinement is available. The flag behind that is owned by the
/// detector, so every detector warns at most once.
#[derive(Debug)]
pub struct ModeDetector {
	mount_point: Option<PathBuf>,
	warned: AtomicBool,
}

impl ModeDetector {
	pub const fn new() -> Self {
		Self {
			mount_point: None,
			warned: AtomicBool::new(false),
		}
	}

	pub fn with_mount_point(path: impl AsRef<Path>) -> Self {
		Self {
			mount_point: Some(path.as_ref().to_path_buf()),
			warned: AtomicBool::new(false),
		}
	}

	/// The detector shared by the whole process.
	pub fn global() -> &'static ModeDetector {
		&GLOBAL
	}

	pub fn mount_point(&self) -> &Path {
		self.mount_point.as_deref().unwrap_or_else(|| Path::new(CG_BASE_DIR))
	}

	/// A missing mount point means cgroupfs is not mounted where the unified
	/// layout would put it, which counts as legacy. Any other statfs failure is
	/// an error.
	pub fn detect(&self) -> Result<CgroupMode> {
		let path = self.mount_point();
		let mode = match statfs(path) {
			Ok(stat) => CgroupMode::from_fs_type(stat.filesystem_type()),
			Err(Errno::ENOENT) => return Ok(CgroupMode::LegacyOrHybrid),
			Err(e) => return Err(e).context(StatfsSnafu { path }),
		};
		if mode == CgroupMode::Unified {
			self.warn_once();
		}
		Ok(mode)
	}

	pub fn is_unified(&self) -> Result<bool> {
		Ok(self.detect()? == CgroupMode::Unified)
	}

	pub fn did_warn(&self) -> bool {
		self.warned.load(Ordering::Acquire)
	}

	pub fn reset_warning(&self) {
		self.warned.store(false, Ordering::Release);
	}

	fn warn_once(&self) -> bool {
		if self
			.warned
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return false;
		}
		log::warn!("cgroup v2 is not fully supported yet, proceeding with partial confinement");
		true
	}
}

impl Default for ModeDetector {
	fn default() -> Self {
		Self::new()
	}
}
