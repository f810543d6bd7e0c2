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

//! Finding the unified hierarchy a process belongs to.

use crate::error::*;
use crate::mode::{CgroupMode, ModeDetector};
use nix::libc;
use nix::unistd::Pid;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Hierarchy id the kernel reports for the unified hierarchy. Every v1
/// hierarchy has a non-zero id.
const UNIFIED_HIERARCHY_ID: &[u8] = b"0";

fn split_colon(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
	let at = bytes.iter().position(|&b| b == b':')?;
	Some((&bytes[..at], &bytes[at + 1..]))
}

/// One line of `/proc/<pid>/cgroup`: `hierarchy-id:controller-list:cgroup-path`.
///
/// See cgroups(7) for the format. Cgroup names may hold any byte, so the
/// record is kept as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CgroupRecord<'a> {
	pub hierarchy_id: &'a [u8],
	pub controllers: &'a [u8],
	pub path: &'a [u8],
}

impl<'a> CgroupRecord<'a> {
	/// Parses a record without its trailing newline. Exactly two colons are
	/// accepted; the line is rejected rather than guessed at otherwise.
	pub fn parse(line: &'a [u8]) -> Result<Self> {
		let malformed = |expected: &'static str| MalformedRecordSnafu {
			expected,
			line: String::from_utf8_lossy(line),
		};
		let (hierarchy_id, rest) = split_colon(line).context(malformed("hierarchy id"))?;
		let (controllers, path) = split_colon(rest).context(malformed("controller list"))?;
		ensure!(!path.contains(&b':'), malformed("end of line"));
		Ok(Self {
			hierarchy_id,
			controllers,
			path,
		})
	}

	pub fn is_unified(&self) -> bool {
		self.hierarchy_id == UNIFIED_HIERARCHY_ID
	}

	pub fn controller_list(&self) -> impl Iterator<Item = &'a OsStr> {
		self.controllers
			.split(|&b| b == b',')
			.filter(|c| !c.is_empty())
			.map(OsStr::from_bytes)
	}

	/// The cgroup path without its leading slash.
	pub fn relative_path(&self) -> &'a Path {
		let path = self.path.strip_prefix(b"/").unwrap_or(self.path);
		Path::new(OsStr::from_bytes(path))
	}
}

/// Scans a cgroup membership report and returns the relative path of the
/// first unified record. `source` only names the report in errors.
///
/// Reading stops at the first match.
pub fn find_unified_path<R: BufRead>(mut reader: R, source: &Path) -> Result<PathBuf> {
	let mut buf = Vec::new();
	loop {
		buf.clear();
		let len = reader
			.read_until(b'\n', &mut buf)
			.context(ReadReportSnafu { path: source })?;
		if len == 0 {
			break;
		}
		let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
		let record = CgroupRecord::parse(line)?;
		log::debug!(
			"cgroup presence: id:{}, controllers:{}, path:{}",
			record.hierarchy_id.escape_ascii(),
			record.controllers.escape_ascii(),
			record.path.escape_ascii()
		);
		if record.is_unified() {
			return Ok(record.relative_path().to_path_buf());
		}
	}
	UnifiedPathNotFoundSnafu { path: source }.fail()
}

/// Absolute path of a cgroup directory in the unified hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyPath(PathBuf);

impl HierarchyPath {
	/// Unified hierarchy of the calling process.
	pub fn current(detector: &ModeDetector) -> Result<Self> {
		Self::for_pid(nix::unistd::getpid(), detector)
	}

	/// Unified hierarchy of `pid`, read from `/proc/<pid>/cgroup`.
	pub fn for_pid(pid: Pid, detector: &ModeDetector) -> Result<Self> {
		let report = PathBuf::from(format!("/proc/{}/cgroup", pid));
		let file = OpenOptions::new()
			.read(true)
			.custom_flags(libc::O_NOFOLLOW)
			.open(&report)
			.context(OpenReportSnafu { path: &report })?;
		let relative = find_unified_path(BufReader::new(file), &report)?;
		// TODO: find the mount point in /proc/self/mountinfo instead of
		// assuming the conventional layout.
		let path = Self::from_relative(detector.detect()?, &relative)?;
		log::debug!("unified/v2 cgroup path is {}", path);
		Ok(path)
	}

	/// Places a hierarchy-relative path under the root used by `mode`.
	///
	/// # Examples
	///
	/// ```
	/// use cg2join::{CgroupMode, HierarchyPath};
	///
	/// let path = HierarchyPath::from_relative(CgroupMode::Unified, "user.slice/foo.service").unwrap();
	/// assert_eq!(path.as_path().to_str(), Some("/sys/fs/cgroup/user.slice/foo.service"));
	/// let path = HierarchyPath::from_relative(CgroupMode::LegacyOrHybrid, "user.slice").unwrap();
	/// assert_eq!(path.as_path().to_str(), Some("/sys/fs/cgroup/unified/user.slice"));
	/// ```
	pub fn from_relative(mode: CgroupMode, relative: impl AsRef<Path>) -> Result<Self> {
		let mut path = OsString::from(mode.root());
		path.push("/");
		path.push(relative.as_ref());
		ensure!(
			path.len() <= libc::PATH_MAX as usize,
			PathTooLongSnafu {
				path: path.to_string_lossy()
			}
		);
		Ok(Self(PathBuf::from(path)))
	}

	pub fn from_path(path: impl AsRef<Path>) -> Self {
		Self(PathBuf::from(path.as_ref()))
	}

	pub fn as_path(&self) -> &Path {
		&self.0
	}

	/// # Examples
	///
	/// ```
	/// use cg2join::HierarchyPath;
	///
	/// let parent = HierarchyPath::from_path("/sys/fs/cgroup/a");
	/// let child = parent.child("snap.b");
	/// assert_eq!(child.as_path().to_str(), Some("/sys/fs/cgroup/a/snap.b"));
	/// ```
	pub fn child(&self, name: impl AsRef<Path>) -> Self {
		Self(self.0.join(name))
	}
}

impl AsRef<Path> for HierarchyPath {
	fn as_ref(&self) -> &Path {
		&self.0
	}
}

impl fmt::Display for HierarchyPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.display().fmt(f)
	}
}

/// Unified hierarchy of `pid`, using the process-wide mode detector.
pub fn locate_unified_hierarchy(pid: Pid) -> Result<HierarchyPath> {
	HierarchyPath::for_pid(pid, ModeDetector::global())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;

	fn find(report: &[u8]) -> Result<PathBuf> {
		find_unified_path(report, Path::new("/proc/self/cgroup"))
	}

	#[test]
	fn test_parse_record() {
		let record = CgroupRecord::parse(b"4:cpu,cpuacct:/user.slice").unwrap();
		assert_eq!(record.hierarchy_id, b"4");
		assert_eq!(record.controller_list().collect::<Vec<_>>(), ["cpu", "cpuacct"]);
		assert_eq!(record.relative_path(), Path::new("user.slice"));
		assert!(!record.is_unified());

		let record = CgroupRecord::parse(b"0::/").unwrap();
		assert!(record.is_unified());
		assert_eq!(record.controller_list().count(), 0);
		assert_eq!(record.relative_path(), Path::new(""));
	}

	#[test]
	fn test_parse_record_malformed() {
		let err = CgroupRecord::parse(b"0").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Format);
		assert_eq!(err.to_string(), "cannot parse cgroup, expected hierarchy id: 0");

		let err = CgroupRecord::parse(b"0:/x").unwrap_err();
		assert_eq!(err.to_string(), "cannot parse cgroup, expected controller list: 0:/x");

		let err = CgroupRecord::parse(b"0:::/x").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Format);
		assert_eq!(err.to_string(), "cannot parse cgroup, expected end of line: 0:::/x");

		assert!(CgroupRecord::parse(b"").is_err());
	}

	#[test]
	fn test_find_unified() {
		assert_eq!(find(b"0::/user.slice/foo.service\n").unwrap(), Path::new("user.slice/foo.service"));
		assert_eq!(find(b"0::/user.slice/foo.service").unwrap(), Path::new("user.slice/foo.service"));
		assert_eq!(find(b"0::relative\n").unwrap(), Path::new("relative"));

		let hybrid = b"12:pids:/user.slice\n\
			11:cpu,cpuacct:/user.slice\n\
			1:name=systemd:/user.slice/session-1.scope\n\
			0::/user.slice/session-1.scope\n";
		assert_eq!(find(hybrid).unwrap(), Path::new("user.slice/session-1.scope"));
	}

	#[test]
	fn test_find_first_unified_wins() {
		assert_eq!(find(b"0::/first\n0::/second\n").unwrap(), Path::new("first"));
		// Lines after the match are never looked at.
		assert_eq!(find(b"0::/first\ngarbage\n").unwrap(), Path::new("first"));
	}

	#[test]
	fn test_find_not_found() {
		let err = find(b"1:cpu,cpuacct:/\n").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Logical);
		assert!(err.to_string().starts_with("cannot find unified cgroup path"));

		assert_eq!(find(b"").unwrap_err().kind(), ErrorKind::Logical);
	}

	#[test]
	fn test_find_malformed() {
		let err = find(b"1:cpu:/\n0:::/x\n").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Format);
		assert!(err.to_string().ends_with("0:::/x"));

		assert_eq!(find(b"\n0::/\n").unwrap_err().kind(), ErrorKind::Format);
		assert_eq!(find(b"1:cpu\n").unwrap_err().kind(), ErrorKind::Format);
		assert_eq!(find(b"1:cpu:/caf\xe9:x\n").unwrap_err().kind(), ErrorKind::Format);
	}

	#[test]
	fn test_find_non_utf8_names() {
		let found = find(b"1:name=systemd:/caf\xe9\n0::/user.slice\n").unwrap();
		assert_eq!(found, Path::new("user.slice"));

		let found = find(b"0::/caf\xe9/snap\n").unwrap();
		assert_eq!(found.as_os_str().as_bytes(), b"caf\xe9/snap");
		let path = HierarchyPath::from_relative(CgroupMode::Unified, &found).unwrap();
		assert_eq!(path.as_path().as_os_str().as_bytes(), b"/sys/fs/cgroup/caf\xe9/snap");
	}

	#[test]
	fn test_from_relative() {
		let path = HierarchyPath::from_relative(CgroupMode::Unified, "user.slice/foo.service").unwrap();
		assert_eq!(path.to_string(), "/sys/fs/cgroup/user.slice/foo.service");
		let path =
			HierarchyPath::from_relative(CgroupMode::LegacyOrHybrid, "user.slice/foo.service").unwrap();
		assert_eq!(path.to_string(), "/sys/fs/cgroup/unified/user.slice/foo.service");
		let path = HierarchyPath::from_relative(CgroupMode::Unified, "").unwrap();
		assert_eq!(path.to_string(), "/sys/fs/cgroup/");
	}

	#[test]
	fn test_from_relative_too_long() {
		let long = "a".repeat(libc::PATH_MAX as usize);
		let err = HierarchyPath::from_relative(CgroupMode::Unified, &long).unwrap_err();
		assert!(matches!(err, Error::PathTooLong { .. }));
	}

	#[test]
	fn test_for_missing_pid() {
		let detector = ModeDetector::new();
		let err = HierarchyPath::for_pid(Pid::from_raw(i32::MAX), &detector).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Environment);
		assert_eq!(err.to_string(), format!("cannot open /proc/{}/cgroup", i32::MAX));
	}

	#[test]
	fn test_current() {
		let detector = ModeDetector::new();
		match HierarchyPath::current(&detector) {
			Ok(path) => assert!(path.as_path().starts_with("/sys/fs/cgroup")),
			// Hosts without a unified hierarchy have no id 0 record.
			Err(e) => assert_eq!(e.kind(), ErrorKind::Logical),
		}
	}
}
