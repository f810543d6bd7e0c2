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

//! Creating a child cgroup and moving a process into it.
//!
//! The caller may be privileged while the cgroup tree is not trusted, so
//! nothing below resolves a path twice. The parent is opened once and every
//! later step works relative to a descriptor.

use crate::error::*;
use nix::errno::Errno;
use nix::fcntl::{open, openat, OFlag};
use nix::libc;
use nix::sys::stat::{mkdirat, Mode};
use nix::unistd::Pid;
use std::fs::File;
use std::io::Write;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

/// Membership file of a cgroup.
pub const CGROUP_PROCS: &str = "cgroup.procs";

const CHILD_MODE: u32 = 0o755;

fn dir_flags() -> OFlag {
	OFlag::O_PATH | OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC
}

pub(crate) fn check_name(name: &str) -> Result<&str> {
	ensure!(
		!name.is_empty() && name != "." && name != ".." && !name.contains(|c| c == '/' || c == '\0'),
		InvalidNameSnafu { name }
	);
	Ok(name)
}

/// An `O_PATH` descriptor of a directory that was not reached through a
/// symlink. The path is kept for messages only.
#[derive(Debug)]
pub struct DirHandle {
	fd: OwnedFd,
	path: PathBuf,
}

impl DirHandle {
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let fd = open(path, dir_flags(), Mode::empty()).context(OpenHierarchySnafu { path })?;
		Ok(Self::from_raw(fd, path.to_path_buf()))
	}

	fn from_raw(fd: RawFd, path: PathBuf) -> Self {
		Self {
			fd: unsafe { OwnedFd::from_raw_fd(fd) },
			path,
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Creates `name` with mode 0755. Returns `false` if it already existed.
	pub fn create_child(&self, name: &str) -> Result<bool> {
		let name = check_name(name)?;
		match mkdirat(self.fd.as_raw_fd(), name, Mode::from_bits_truncate(CHILD_MODE)) {
			Ok(()) => Ok(true),
			Err(Errno::EEXIST) => Ok(false),
			Err(e) => Err(e).context(CreateHierarchySnafu {
				path: self.path.join(name),
			}),
		}
	}

	pub fn open_child(&self, name: &str) -> Result<DirHandle> {
		let name = check_name(name)?;
		let path = self.path.join(name);
		let fd = openat(self.fd.as_raw_fd(), name, dir_flags(), Mode::empty())
			.context(OpenHierarchySnafu { path: &path })?;
		Ok(Self::from_raw(fd, path))
	}

	/// Sets owner and group of the directory itself to 0:0.
	pub fn chown_to_root(&self) -> Result<()> {
		let ret = unsafe {
			libc::fchownat(
				self.fd.as_raw_fd(),
				b"\0".as_ptr().cast(),
				0,
				0,
				libc::AT_EMPTY_PATH,
			)
		};
		Errno::result(ret).context(ChownHierarchySnafu { path: &self.path })?;
		Ok(())
	}

	/// Opens `cgroup.procs` for writing.
	pub fn open_procs(&self) -> Result<File> {
		let fd = openat(
			self.fd.as_raw_fd(),
			CGROUP_PROCS,
			OFlag::O_WRONLY | OFlag::O_NOFOLLOW | OFlag::O_CLOEXEC,
			Mode::empty(),
		)
		.context(OpenProcsSnafu {
			path: self.path.join(CGROUP_PROCS),
		})?;
		Ok(unsafe { File::from_raw_fd(fd) })
	}
}

/// Writes `pid` in decimal with a single write. The kernel either takes the
/// whole number or rejects it, so a short write is an error and is not retried.
pub fn write_pid<W: Write>(writer: &mut W, pid: Pid, hierarchy: &Path) -> Result<()> {
	let buf = pid.as_raw().to_string();
	let written = writer.write(buf.as_bytes()).context(WriteProcsSnafu {
		pid: pid.as_raw(),
		path: hierarchy,
	})?;
	ensure!(
		written == buf.len(),
		ShortWriteSnafu {
			pid: pid.as_raw(),
			path: hierarchy,
			written,
			expected: buf.len(),
		}
	);
	Ok(())
}

/// Makes sure `parent/name` exists and is owned by root, then moves `pid`
/// into it. An existing child is reused.
pub fn create_and_join(parent: impl AsRef<Path>, name: &str, pid: Pid) -> Result<()> {
	let name = check_name(name)?;
	let parent = DirHandle::open(parent)?;
	if parent.create_child(name)? {
		log::debug!("created cgroup hierarchy {}/{}", parent.path().display(), name);
	}
	let hierarchy = parent.open_child(name)?;
	// A setuid but not setgid caller would otherwise leave its own group on
	// the directory.
	hierarchy.chown_to_root()?;
	let mut procs = hierarchy.open_procs()?;
	write_pid(&mut procs, pid, hierarchy.path())?;
	log::debug!(
		"moved process {} to cgroup hierarchy {}",
		pid,
		hierarchy.path().display()
	);
	Ok(())
}
