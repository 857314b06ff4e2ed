//! Durable storage for the codesync client.
//!
//! Everything the pipeline persists lives under a single root directory: the
//! YAML records (repo config, user table, sequence tokens), the diff buffer,
//! and the three mirror trees keyed by `repo_path/branch/relative_path`.

use std::{
    ffi::OsString,
    path::{Component, Path, PathBuf},
};

use structopt::StructOpt;

mod config;
pub use config::{FileId, Repo, RepoConfig};

mod content;
pub use content::is_binary_file;

mod error;
pub use error::Error;

pub mod record;
pub use record::Handle;

mod token;
pub use token::SequenceTokenTable;

mod user;
pub use user::{User, UserTable};

/// Handle to the persisted repo config.
pub type ConfigHandle = Handle<RepoConfig>;

/// Handle to the persisted sequence token table.
pub type TokenHandle = Handle<SequenceTokenTable>;

// Command line options for locating the store.
//
// These should be injected into the global `StructOpt` implementation using the
// `flatten` attribute.
#[derive(Clone, Debug, StructOpt)]
pub struct Opt {
    #[structopt(
        long,
        env = "CODESYNC_ROOT",
        parse(from_os_str),
        help = "root directory holding the codesync records and mirrors (default: ~/.codesync)"
    )]
    root: Option<OsString>,
}

impl Opt {
    /// Resolves the configured root, falling back to `~/.codesync`.
    pub fn paths(&self) -> Result<Paths, Error> {
        match &self.root {
            Some(root) => Ok(Paths::new(root)),
            None => match directories::BaseDirs::new() {
                Some(dirs) => Ok(Paths::new(dirs.home_dir().join(".codesync"))),
                None => Err(Error::NoHomeDirectory),
            },
        }
    }
}

/// The mirror trees kept alongside the user's repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tree {
    /// Last-known-synced content.
    Shadow,
    /// Pristine copies waiting for their first upload.
    Originals,
    /// Content archived at delete time.
    Deleted,
}

#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new<P>(root: P) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yml")
    }

    pub fn user_file(&self) -> PathBuf {
        self.root.join("user.yml")
    }

    pub fn sequence_token_file(&self) -> PathBuf {
        self.root.join("sequence_token.yml")
    }

    pub fn diffs_dir(&self) -> PathBuf {
        self.root.join(".diffs")
    }

    pub fn tree_dir(&self, tree: Tree) -> PathBuf {
        self.root.join(match tree {
            Tree::Shadow => ".shadow",
            Tree::Originals => ".originals",
            Tree::Deleted => ".deleted",
        })
    }

    /// The directory in `tree` that mirrors the given repo and branch.
    ///
    /// Repo paths are absolute, so only their normal components are kept: the
    /// mirror for `/home/me/repo` on `main` is `<tree>/home/me/repo/main`.
    pub fn mirror_root(&self, tree: Tree, repo_path: &str, branch: &str) -> PathBuf {
        let mut path = self.tree_dir(tree);
        push_normal(&mut path, Path::new(repo_path));
        push_normal(&mut path, Path::new(branch));
        path
    }

    /// The mirror location of a single repo-relative path.
    pub fn mirror(&self, tree: Tree, repo_path: &str, branch: &str, rel_path: &str) -> PathBuf {
        let mut path = self.mirror_root(tree, repo_path, branch);
        push_normal(&mut path, Path::new(rel_path));
        path
    }

    /// Creates the root, the diff buffer, and the mirror trees if they don't
    /// exist yet.
    pub fn ensure_dirs(&self) -> Result<(), Error> {
        for dir in [
            self.root.clone(),
            self.diffs_dir(),
            self.tree_dir(Tree::Originals),
            self.tree_dir(Tree::Shadow),
            self.tree_dir(Tree::Deleted),
        ]
        .iter()
        {
            if !dir.exists() {
                log::debug!("creating {}", dir.display());
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }

    /// Returns true if `rel_path` is a directory in the shadow tree, meaning a
    /// delete event for it has to be expanded per file.
    pub fn is_dir_in_shadow(&self, repo_path: &str, branch: &str, rel_path: &str) -> bool {
        self.mirror(Tree::Shadow, repo_path, branch, rel_path)
            .is_dir()
    }
}

/// Converts a path into the forward-slash form used as a config key.
pub fn rel_path_string(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<String>>()
        .join("/")
}

fn push_normal(base: &mut PathBuf, path: &Path) {
    // Anything other than a normal component (root, prefix, `.` or `..`) is
    // dropped, so a mirror path can never escape its tree.
    for component in path.components() {
        if let Component::Normal(part) = component {
            base.push(part);
        }
    }
}
