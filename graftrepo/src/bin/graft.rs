use clap::{
    Parser,
    Subcommand,
};
use graftrepo::{
    RepositoryHandle,
    error::GraftRepoError,
    migrate::{
        MigrationOptions,
        PushPolicy,
        PushTarget,
        migrate,
    },
};
use std::{
    io::{
        self,
        Write,
    },
    path::PathBuf,
};

#[derive(Debug, Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(long, value_name = "GRAFT_SRC", env = "GRAFT_SRC")]
    src: PathBuf,
    #[clap(long, value_name = "GRAFT_SRC_DIR", env = "GRAFT_SRC_DIR", default_value = "")]
    src_dir: String,
    #[clap(long, value_name = "GRAFT_BRANCH", env = "GRAFT_BRANCH", default_value = "master")]
    branch: String,
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(short = 'j', long = "json")]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the commits touching the source directory, oldest first
    Log,
    /// Show the filtered changes of a single source commit
    #[command(arg_required_else_help = true)]
    Patch {
        digest: String,
    },
    /// Transplant the filtered history onto the destination
    Migrate {
        #[clap(long, value_name = "GRAFT_DST", env = "GRAFT_DST")]
        dst: PathBuf,
        #[clap(long, value_name = "GRAFT_DST_DIR", env = "GRAFT_DST_DIR", default_value = "")]
        dst_dir: String,
        #[clap(long, value_name = "GRAFT_DST_BRANCH", env = "GRAFT_DST_BRANCH", default_value = "master")]
        dst_branch: String,
        #[clap(long, value_name = "GRAFT_COMMITTER_NAME", env = "GRAFT_COMMITTER_NAME")]
        committer_name: String,
        #[clap(long, value_name = "GRAFT_COMMITTER_EMAIL", env = "GRAFT_COMMITTER_EMAIL")]
        committer_email: String,
        #[clap(long)]
        after: Option<String>,
        #[clap(long, value_name = "GRAFT_REMOTE", env = "GRAFT_REMOTE")]
        remote: Option<String>,
        #[clap(long, requires = "remote")]
        push_each: bool,
    },
}

fn report(err: &GraftRepoError) {
    if let GraftRepoError::ApplyConflict(conflict) = err {
        eprintln!("the rejected patch follows:\n{}", conflict.patch());
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    stderrlog::new()
        .module(module_path!())
        .module("graftrepo")
        .verbosity((args.verbose as usize) + 1)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let src = RepositoryHandle::open(&args.src, &args.src_dir, &args.branch)?;
    let mut stdout = io::stdout().lock();

    match args.command {
        Commands::Log => {
            let log = src.log()?;
            if args.json {
                serde_json::to_writer(&mut stdout, &log)?;
                writeln!(stdout)?;
            } else {
                for entry in log.iter() {
                    writeln!(stdout, "{entry}")?;
                }
            }
        }
        Commands::Patch { digest } => {
            let patch = src.patch(&digest)?;
            if args.json {
                serde_json::to_writer(&mut stdout, &patch)?;
                writeln!(stdout)?;
            } else {
                write!(stdout, "{patch}")?;
            }
        }
        Commands::Migrate {
            dst,
            dst_dir,
            dst_branch,
            committer_name,
            committer_email,
            after,
            remote,
            push_each,
        } => {
            let mut dst = RepositoryHandle::open(&dst, &dst_dir, &dst_branch)?;
            dst.configure("user.name", &committer_name)?;
            dst.configure("user.email", &committer_email)?;
            let policy = match remote {
                None => {
                    if dst.is_clone() {
                        log::warn!(
                            "{:?} is bare and no remote was given; \
                             migrated commits will not be kept",
                            dst.root_path(),
                        );
                    }
                    PushPolicy::Never
                }
                Some(remote) => {
                    let target = PushTarget {
                        remote,
                        branch: dst_branch.clone(),
                    };
                    if push_each {
                        PushPolicy::EachCommit(target)
                    } else {
                        PushPolicy::AtEnd(target)
                    }
                }
            };
            let options = MigrationOptions { after, policy };
            let units = match migrate(&src, &mut dst, &options) {
                Ok(units) => units,
                Err(err) => {
                    for unit in err.completed.iter() {
                        eprintln!("{unit}");
                    }
                    report(&err.source);
                    return Err(err.into());
                }
            };
            if args.json {
                serde_json::to_writer(&mut stdout, &units)?;
                writeln!(stdout)?;
            } else {
                for unit in units.iter() {
                    writeln!(stdout, "{unit}")?;
                }
            }
        }
    }

    Ok(())
}
