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

use cg2join::internal;
use cg2join::ModeDetector;
use cg2join::Pid;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::process;

#[derive(Parser, Debug)]
#[command(version, about = "Moves processes into per-tag child control groups of their unified hierarchy")]
struct Cli {
	/// Print debug traces to stderr.
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Args, Debug)]
struct LocateCommand {
	/// Process ID to look up. Defaults to this process.
	#[arg(value_parser = clap::value_parser!(i32).range(1..))]
	pid: Option<i32>,
}

#[derive(Args, Debug)]
struct JoinCommand {
	/// Security tag, used as the name of the child control group.
	#[arg()]
	tag: String,

	/// Process IDs to move.
	#[arg(value_delimiter = ',', required = true, value_parser = clap::value_parser!(i32).range(1..))]
	pids: Vec<i32>,
}

#[derive(Args, Debug)]
struct ExecCommand {
	/// Security tag, used as the name of the child control group.
	#[arg()]
	tag: String,

	/// The program to run and its arguments. Everything after the tag is passed through untouched.
	#[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
	command: Vec<OsString>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Prints whether the system uses the unified cgroup layout
	Mode,
	/// Prints the unified control group of a process
	Locate(LocateCommand),
	/// Moves running processes into the child control group of their current one
	Join(JoinCommand),
	/// Joins the child control group, then runs a program in it
	Exec(ExecCommand),
}

fn run(args: Cli) -> cg2join::Result<()> {
	match args.command {
		Command::Mode => {
			println!("{}", ModeDetector::global().detect()?);
		}
		Command::Locate(cmd_args) => {
			let pid = cmd_args.pid.map(Pid::from_raw).unwrap_or_else(Pid::this);
			println!("{}", cg2join::locate_unified_hierarchy(pid)?);
		}
		Command::Join(cmd_args) => {
			for pid in cmd_args.pids {
				cg2join::join_sub_cgroup(&cmd_args.tag, Pid::from_raw(pid))?;
			}
		}
		Command::Exec(cmd_args) => {
			let (cmd, cmd_rest) = match cmd_args.command.split_first() {
				Some(split) => split,
				None => unreachable!("clap requires a command"),
			};
			cg2join::join_sub_cgroup(&cmd_args.tag, Pid::this())?;
			let status = match process::Command::new(cmd).args(cmd_rest).status() {
				Ok(status) => status,
				Err(e) => {
					eprintln!("cannot run {}: {}", cmd.to_string_lossy(), e);
					process::exit(127);
				}
			};
			process::exit(status.code().or_else(|| status.signal().map(|s| 128 + s)).unwrap_or(1))
		}
	}
	Ok(())
}

fn main() {
	let args = Cli::parse();
	internal::init_logging(args.verbose);
	if let Err(e) = run(args) {
		internal::die(&e);
	}
}

#[cfg(test)]
fn cli(input: &str) -> Result<Cli, String> {
	Cli::try_parse_from(shlex::split(input).unwrap()).map_err(|e| format!("{e}"))
}

#[test]
fn test_cli_mode() {
	insta::assert_debug_snapshot!(cli("cg2join mode"), @r###"
	Ok(
	    Cli {
	        verbose: false,
	        command: Mode,
	    },
	)
	"###);
	assert!(cli("cg2join -v mode").unwrap().verbose);
	assert!(cli("cg2join mode --verbose").unwrap().verbose);
	assert!(cli("cg2join").is_err());
	assert!(cli("cg2join xyz").is_err());
	assert!(cli("cg2join mode extra").is_err());
}

#[test]
fn test_cli_locate() {
	insta::assert_debug_snapshot!(cli("cg2join locate"), @r###"
	Ok(
	    Cli {
	        verbose: false,
	        command: Locate(
	            LocateCommand {
	                pid: None,
	            },
	        ),
	    },
	)
	"###);
	insta::assert_debug_snapshot!(cli("cg2join locate 123"), @r###"
	Ok(
	    Cli {
	        verbose: false,
	        command: Locate(
	            LocateCommand {
	                pid: Some(
	                    123,
	                ),
	            },
	        ),
	    },
	)
	"###);
	assert!(cli("cg2join locate pid").is_err());
	assert!(cli("cg2join locate 0").is_err());
	assert!(cli("cg2join locate 123 456").is_err());
}

#[test]
fn test_cli_join() {
	insta::assert_debug_snapshot!(cli("cg2join join snap.foo 123,456"), @r###"
	Ok(
	    Cli {
	        verbose: false,
	        command: Join(
	            JoinCommand {
	                tag: "snap.foo",
	                pids: [
	                    123,
	                    456,
	                ],
	            },
	        ),
	    },
	)
	"###);
	let Ok(Cli {
		command: Command::Join(join),
		..
	}) = cli("cg2join join snap.foo 123 456")
	else {
		panic!("expected join");
	};
	assert_eq!(join.pids, [123, 456]);
	assert!(cli("cg2join join").is_err());
	assert!(cli("cg2join join snap.foo").is_err());
	assert!(cli("cg2join join snap.foo pid").is_err());
	assert!(cli("cg2join join snap.foo -1").is_err());
}

#[test]
fn test_cli_exec() {
	insta::assert_debug_snapshot!(cli("cg2join exec snap.foo sh -c true"), @r###"
	Ok(
	    Cli {
	        verbose: false,
	        command: Exec(
	            ExecCommand {
	                tag: "snap.foo",
	                command: [
	                    "sh",
	                    "-c",
	                    "true",
	                ],
	            },
	        ),
	    },
	)
	"###);

	let Ok(Cli {
		command: Command::Exec(exec),
		verbose,
	}) = cli("cg2join exec -v snap.foo true")
	else {
		panic!("expected exec");
	};
	assert!(verbose);
	assert_eq!(exec.command, ["true"]);
	assert!(cli("cg2join exec snap.foo").is_err());
}

#[test]
fn test_cli_exec_keeps_child_flags() {
	for (input, expected) in [
		("cg2join exec snap.foo sh -v", &["sh", "-v"][..]),
		("cg2join exec snap.foo grep -v x", &["grep", "-v", "x"][..]),
		("cg2join exec snap.foo env --verbose", &["env", "--verbose"][..]),
	] {
		let Ok(Cli {
			command: Command::Exec(exec),
			verbose,
		}) = cli(input)
		else {
			panic!("expected exec for {input}");
		};
		assert!(!verbose, "{input}");
		assert_eq!(exec.command, expected, "{input}");
	}
}
