mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loam_core::config::{GLOBAL_CONFIG_NAME, SYSTEM_CONFIG_NAME};
use loam_core::{ErrorKind, ObjectId, Repository, dir, locate};
use output::{
    ConfigGetOutput, ConfigLocateOutput, ConfigSetOutput, HashObjectOutput, HashedObject,
    InitOutput, ObjectInfoOutput, OutputWriter, PathOutput,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Loam - blob ingestion into a loose object database
#[derive(Parser)]
#[command(name = "loam")]
#[command(about = "Store files as content-addressed blobs", long_about = None)]
#[command(version)]
struct Cli {
    /// Repository directory (defaults to LOAM_DIR env var or the current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository
    Init {
        /// Keep metadata directly in the root, with no working directory
        #[arg(long)]
        bare: bool,
    },

    /// Store files from the working directory (or stdin) as blobs
    HashObject {
        /// Paths relative to the working directory
        #[arg(required_unless_present = "stdin", conflicts_with = "stdin")]
        paths: Vec<PathBuf>,

        /// Read the blob content from standard input
        #[arg(long)]
        stdin: bool,
    },

    /// Print an object's content, kind or size
    CatFile {
        /// Object id (hex)
        id: String,

        /// Print the object kind
        #[arg(short = 't', conflicts_with = "size")]
        kind: bool,

        /// Print the object size
        #[arg(short = 's')]
        size: bool,
    },

    /// Read and write configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Remove a directory tree
    RmTree {
        path: PathBuf,

        /// Remove files too, not only empty directories
        #[arg(long)]
        force: bool,
    },

    /// Create a directory and any missing parents
    Mkdir { path: PathBuf },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Look up a key across system, global and repository config
    Get { key: String },

    /// Set a key in the repository config
    Set { key: String, value: String },

    /// Show where the system and global config files are
    Locate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Repository root: CLI arg > LOAM_DIR env var > current directory
    let root = cli
        .root
        .or_else(|| std::env::var_os("LOAM_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let out = OutputWriter::new(cli.json);

    let result = match cli.command {
        Commands::Init { bare } => cmd_init(&out, &root, bare),
        Commands::HashObject { paths, stdin } => cmd_hash_object(&out, &root, &paths, stdin),
        Commands::CatFile { id, kind, size } => cmd_cat_file(&out, &root, &id, kind, size),
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Get { key } => cmd_config_get(&out, &root, &key),
            ConfigCommands::Set { key, value } => cmd_config_set(&out, &root, &key, &value),
            ConfigCommands::Locate => cmd_config_locate(&out),
        },
        Commands::RmTree { path, force } => cmd_rm_tree(&out, &path, force),
        Commands::Mkdir { path } => cmd_mkdir(&out, &path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = result_code(&e);
            out.write_error(&e, code);
            ExitCode::from(code)
        }
    }
}

/// Map an error to a process exit code.
fn result_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<loam_core::Error>().map(|e| e.kind()) {
        Some(ErrorKind::NotFound) => 2,
        Some(ErrorKind::AlreadyExists) => 3,
        Some(ErrorKind::SizeMismatch) => 4,
        _ => 1,
    }
}

fn open_repo(root: &Path) -> Result<Repository> {
    Repository::open(root)
        .with_context(|| format!("Failed to open repository at {}", root.display()))
}

fn cmd_init(out: &OutputWriter, root: &Path, bare: bool) -> Result<()> {
    let repo = Repository::init(root, bare)
        .with_context(|| format!("Failed to initialize repository at {}", root.display()))?;

    let output = InitOutput {
        success: true,
        result_code: 0,
        path: repo.path().display().to_string(),
        bare,
        algorithm: loam_core::Algorithm::Blake3.as_str().to_string(),
    };

    out.write(&output, || {
        format!(
            "Initialized {}loam repository in {}\n",
            if bare { "bare " } else { "" },
            output.path
        )
    })
}

fn cmd_hash_object(out: &OutputWriter, root: &Path, paths: &[PathBuf], stdin: bool) -> Result<()> {
    let repo = open_repo(root)?;
    let mut objects = Vec::new();

    if stdin {
        if atty::is(atty::Stream::Stdin) {
            anyhow::bail!("Refusing to read blob content from a terminal; pipe data into --stdin");
        }

        let mut content = Vec::new();
        std::io::stdin()
            .read_to_end(&mut content)
            .context("Failed to read standard input")?;
        let id = repo
            .create_blob_from_buffer(&content)
            .context("Failed to store standard input")?;
        objects.push(HashedObject { id, path: None });
    } else {
        for path in paths {
            let id = repo
                .create_blob_from_workdir(path)
                .with_context(|| format!("Failed to add path: {}", path.display()))?;
            objects.push(HashedObject {
                id,
                path: Some(path.display().to_string()),
            });
        }
    }

    let output = HashObjectOutput {
        success: true,
        result_code: 0,
        objects,
    };

    out.write(&output, || {
        output
            .objects
            .iter()
            .map(|o| match &o.path {
                Some(path) => format!("{} {}\n", o.id, path),
                None => format!("{}\n", o.id),
            })
            .collect()
    })
}

fn cmd_cat_file(out: &OutputWriter, root: &Path, id_str: &str, kind: bool, size: bool) -> Result<()> {
    let repo = open_repo(root)?;
    let id = ObjectId::from_hex(id_str).with_context(|| format!("Invalid object id: {}", id_str))?;

    if kind || size || out.is_json() {
        let header = repo
            .odb()
            .read_header(&id)
            .with_context(|| format!("Failed to read object {}", id))?;

        let output = ObjectInfoOutput {
            success: true,
            result_code: 0,
            id,
            kind: header.kind.as_str().to_string(),
            size: header.content_len,
            compressed: header.compression != loam_core::CompressionType::None,
        };

        return out.write(&output, || {
            if kind {
                format!("{}\n", output.kind)
            } else {
                format!("{}\n", output.size)
            }
        });
    }

    let blob = repo
        .lookup_blob(&id)
        .with_context(|| format!("Failed to read blob {}", id))?;
    out.write_raw(blob.raw_content())
}

fn cmd_config_get(out: &OutputWriter, root: &Path, key: &str) -> Result<()> {
    let repo = open_repo(root)?;
    let config = repo
        .layered_config()
        .context("Failed to load configuration")?;

    let value = config
        .get(key)
        .ok_or_else(|| loam_core::Error::not_found(format!("config key '{}'", key)))?
        .to_string();

    let output = ConfigGetOutput {
        success: true,
        result_code: 0,
        key: key.to_string(),
        value,
    };

    out.write(&output, || format!("{}\n", output.value))
}

fn cmd_config_set(out: &OutputWriter, root: &Path, key: &str, value: &str) -> Result<()> {
    let mut repo = open_repo(root)?;

    repo.config_mut().set(key, value);
    repo.config_mut()
        .save()
        .with_context(|| format!("Failed to write config key: {}", key))?;

    let output = ConfigSetOutput {
        success: true,
        result_code: 0,
        key: key.to_string(),
        value: value.to_string(),
        path: repo.config().path().display().to_string(),
    };

    out.write(&output, || format!("{}={}\n", output.key, output.value))
}

fn cmd_config_locate(out: &OutputWriter) -> Result<()> {
    let system = locate::find_system(SYSTEM_CONFIG_NAME).map(|p| p.display().to_string());

    let (global, global_error) = match locate::find_global(GLOBAL_CONFIG_NAME) {
        Ok(path) => (path.map(|p| p.display().to_string()), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let output = ConfigLocateOutput {
        success: true,
        result_code: 0,
        system,
        global,
        global_error,
    };

    out.write(&output, || {
        let describe = |p: &Option<String>| p.clone().unwrap_or_else(|| "(none)".to_string());
        let mut text = format!("system: {}\n", describe(&output.system));
        match &output.global_error {
            Some(err) => text.push_str(&format!("global: ({})\n", err)),
            None => text.push_str(&format!("global: {}\n", describe(&output.global))),
        }
        text
    })
}

fn cmd_rm_tree(out: &OutputWriter, path: &Path, force: bool) -> Result<()> {
    dir::remove_recursive(path, force)
        .with_context(|| format!("Failed to remove {}", path.display()))?;

    let output = PathOutput {
        success: true,
        result_code: 0,
        path: path.display().to_string(),
    };

    out.write(&output, || format!("Removed {}\n", output.path))
}

fn cmd_mkdir(out: &OutputWriter, path: &Path) -> Result<()> {
    dir::create_recursive(path, None, dir::DEFAULT_DIR_MODE)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let output = PathOutput {
        success: true,
        result_code: 0,
        path: path.display().to_string(),
    };

    out.write(&output, || format!("Created {}\n", output.path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hash_object_paths() {
        let cli = Cli::try_parse_from(["loam", "hash-object", "a.txt", "dir/b.txt"]).unwrap();
        match cli.command {
            Commands::HashObject { paths, stdin } => {
                assert!(!stdin);
                assert_eq!(paths, vec![PathBuf::from("a.txt"), PathBuf::from("dir/b.txt")]);
            }
            _ => panic!("expected hash-object"),
        }
    }

    #[test]
    fn test_hash_object_requires_input() {
        assert!(Cli::try_parse_from(["loam", "hash-object"]).is_err());
        assert!(Cli::try_parse_from(["loam", "hash-object", "--stdin", "x"]).is_err());
    }

    #[test]
    fn test_result_code_follows_error_kind() {
        let err = anyhow::Error::new(loam_core::Error::not_found("thing"));
        assert_eq!(result_code(&err), 2);

        let err = anyhow::Error::new(loam_core::Error::size_mismatch("f", 1, 2));
        assert_eq!(result_code(&err), 4);

        assert_eq!(result_code(&anyhow::anyhow!("other")), 1);
    }
}
