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

//! This package moves a process into a dedicated child of its unified control group (cgroups v2), as one step of confining it.
//!
//! The process's current cgroup is read from `/proc/<pid>/cgroup`, a child named after a security tag is created under it if needed, handed to root, and the process is written to the child's `cgroup.procs`.
//! All filesystem access below the parent cgroup goes through directory descriptors, never through re-resolved paths.
//!
//! Errors are returned, never acted on. A program using this crate is expected to stop at the first one; [`internal::die`] does that for the `cg2join` tool.

pub mod error;
mod hierarchy;
mod join;
mod mode;

#[doc(hidden)]
pub mod internal;

pub use error::{Error, ErrorKind, Result};
pub use hierarchy::{find_unified_path, locate_unified_hierarchy, CgroupRecord, HierarchyPath};
pub use join::{create_and_join, write_pid, DirHandle, CGROUP_PROCS};
pub use mode::{CgroupMode, ModeDetector, CG_BASE_DIR, CG_UNIFIED_DIR};
pub use nix::unistd::Pid;

/// Moves `pid` into the child cgroup `security_tag` of its current unified
/// hierarchy, creating the child if it does not exist yet.
///
/// The tag is checked before anything is read or created.
pub fn join_sub_cgroup(security_tag: &str, pid: Pid) -> Result<()> {
	join_located(locate_unified_hierarchy, security_tag, pid)
}

fn join_located<F>(locate: F, security_tag: &str, pid: Pid) -> Result<()>
where
	F: FnOnce(Pid) -> Result<HierarchyPath>,
{
	let security_tag = join::check_name(security_tag)?;
	let current = locate(pid)?;
	create_and_join(&current, security_tag, pid)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::UnifiedPathNotFoundSnafu;

	#[test]
	fn test_join_sub_cgroup_missing_process() {
		let err = join_sub_cgroup("snap.foo", Pid::from_raw(i32::MAX)).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Environment);
		assert!(matches!(err, Error::OpenReport { .. }));
	}

	#[test]
	fn test_join_sub_cgroup_invalid_tag() {
		for tag in ["../escape", "a/b", "", ".."] {
			let err = join_sub_cgroup(tag, nix::unistd::getpid()).unwrap_err();
			assert!(matches!(err, Error::InvalidName { .. }), "{tag:?}");
		}
		// The tag is rejected before the process is looked up.
		let err = join_sub_cgroup("..", Pid::from_raw(i32::MAX)).unwrap_err();
		assert!(matches!(err, Error::InvalidName { .. }));
	}

	#[test]
	fn test_join_located_locate_error_stops() {
		let dir = tempfile::tempdir().unwrap();
		let err = join_located(
			|_| UnifiedPathNotFoundSnafu { path: "/proc/1/cgroup" }.fail(),
			"snap.foo",
			Pid::from_raw(1),
		)
		.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Logical);
		assert_eq!(err.to_string(), "cannot find unified cgroup path in /proc/1/cgroup");
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
	}

	#[test]
	fn test_join_located_joins_under_located_parent() {
		let dir = tempfile::tempdir().unwrap();
		let parent = HierarchyPath::from_path(dir.path());
		let child = parent.child("snap.foo");
		std::fs::create_dir(&child).unwrap();
		std::fs::write(child.as_path().join(CGROUP_PROCS), "").unwrap();

		let mut located = None;
		let result = join_located(
			|pid| {
				located = Some(pid);
				Ok(parent.clone())
			},
			"snap.foo",
			Pid::from_raw(4321),
		);
		assert_eq!(located, Some(Pid::from_raw(4321)));

		if nix::unistd::Uid::effective().is_root() {
			result.unwrap();
			let procs = std::fs::read_to_string(child.as_path().join(CGROUP_PROCS)).unwrap();
			assert_eq!(procs, "4321");
		} else {
			// The joiner ran against the located parent and stopped at the chown.
			let err = result.unwrap_err();
			assert!(matches!(err, Error::ChownHierarchy { .. }));
			assert!(err.to_string().contains(&child.to_string()));
		}
	}
}
