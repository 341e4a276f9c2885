use clap::{Parser, Subcommand};
use imgstore::auth::{AuthError, OwnerResolver};
use imgstore::config::{self, StoreConfig};
use imgstore::imaging::RustBackend;
use imgstore::output;
use imgstore::records::{Owner, SqliteRepository};
use imgstore::size::Size;
use imgstore::store::{ImageStore, StoreError, UploadRequest};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type Store = ImageStore<RustBackend, SqliteRepository>;

#[derive(Parser)]
#[command(name = "imgstore")]
#[command(about = "Per-user image storage with on-demand resizes")]
#[command(long_about = "\
Per-user image storage with on-demand resizes

Originals are stored under a server-generated name and never modified.
Resizes fit inside a WIDTHxHEIGHT box, keep the aspect ratio, and are
never upscaled. Resizes are found by looking at the filesystem:

  {resizes_dir}/{owner}/{WIDTH}x{HEIGHT}/{stored_filename}

Run 'imgstore gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file; defaults apply when it does not exist
    #[arg(long, default_value = "imgstore.toml", global = true)]
    config: PathBuf,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Credential identifying the owner of the images.
#[derive(clap::Args, Clone)]
struct AuthArgs {
    /// Token from the [auth.tokens] table
    #[arg(long)]
    token: String,
}

/// A `--width`/`--height` pair.
#[derive(clap::Args, Clone, Copy)]
struct SizeArgs {
    #[arg(long)]
    width: u32,
    #[arg(long)]
    height: u32,
}

impl SizeArgs {
    fn size(self) -> Result<Size, StoreError> {
        Ok(Size::new(self.width, self.height)?)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Store an image and optionally create resizes
    Upload {
        #[command(flatten)]
        auth: AuthArgs,
        file: PathBuf,
        /// Comma-separated WIDTHxHEIGHT list, e.g. "200x200,150x150"
        #[arg(long, default_value = "")]
        sizes: String,
        /// Display name recorded with the image (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Create one resize of a stored image and print its URL
    Resize {
        #[command(flatten)]
        auth: AuthArgs,
        filename: String,
        #[command(flatten)]
        size: SizeArgs,
    },
    /// Remove an image, all its resizes, and its record
    Delete {
        #[command(flatten)]
        auth: AuthArgs,
        filename: String,
    },
    /// Show one image and its resizes
    Show {
        #[command(flatten)]
        auth: AuthArgs,
        filename: String,
    },
    /// List all images, newest first
    List {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Create one resize for every image, in parallel
    CreateResizes {
        #[command(flatten)]
        auth: AuthArgs,
        #[command(flatten)]
        size: SizeArgs,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the level.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "imgstore=debug".to_string()
        } else {
            "imgstore=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(exit_code(e.as_ref()))
        }
    }
}

/// 2 for rejected input, 3 for unknown images or credentials, 1 otherwise.
fn exit_code(err: &(dyn Error + 'static)) -> u8 {
    if let Some(e) = err.downcast_ref::<StoreError>() {
        if e.is_validation() {
            return 2;
        }
        if e.is_not_found() {
            return 3;
        }
    }
    match err.downcast_ref::<AuthError>() {
        Some(AuthError::MissingCredential) => 2,
        Some(AuthError::UnknownCredential) => 3,
        None => 1,
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Upload {
            auth,
            file,
            sizes,
            name,
        } => {
            let ctx = Context::load(&cli.config)?;
            let owner = ctx.authenticate(&auth)?;
            let bytes = std::fs::read(&file)?;
            let original_filename = name.unwrap_or_else(|| display_name(&file));
            let outcome = ctx.store.upload(
                &owner,
                UploadRequest {
                    bytes: &bytes,
                    original_filename: &original_filename,
                    sizes: &sizes,
                },
            )?;
            output::print_upload(&outcome)?;
        }
        Command::Resize {
            auth,
            filename,
            size,
        } => {
            let ctx = Context::load(&cli.config)?;
            let owner = ctx.authenticate(&auth)?;
            let size = size.size()?;
            let record = ctx.store.find(&owner, &filename)?;
            output::print_resize(&ctx.store.resize(&record, size)?);
        }
        Command::Delete { auth, filename } => {
            let ctx = Context::load(&cli.config)?;
            let owner = ctx.authenticate(&auth)?;
            let record = ctx.store.find(&owner, &filename)?;
            let report = ctx.store.delete(&record)?;
            output::print_delete(&filename, &report);
        }
        Command::Show { auth, filename } => {
            let ctx = Context::load(&cli.config)?;
            let owner = ctx.authenticate(&auth)?;
            let record = ctx.store.find(&owner, &filename)?;
            output::print_details(&ctx.store.details(record)?);
        }
        Command::List { auth } => {
            let ctx = Context::load(&cli.config)?;
            let owner = ctx.authenticate(&auth)?;
            output::print_list(&ctx.store.list(&owner)?);
        }
        Command::CreateResizes { auth, size } => {
            let ctx = Context::load(&cli.config)?;
            let owner = ctx.authenticate(&auth)?;
            let size = size.size()?;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config::effective_threads(&ctx.config.processing))
                .build()?;
            let report = pool.install(|| ctx.store.resize_all(&owner, size))?;
            output::print_bulk(&report);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Loaded config plus the store it describes.
struct Context {
    config: StoreConfig,
    store: Store,
}

impl Context {
    fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let config = config::load_config(path)?;
        let repository = SqliteRepository::open(&config.database)?;
        let store = ImageStore::new(config.layout(), RustBackend::new(), repository);
        Ok(Self { config, store })
    }

    fn authenticate(&self, auth: &AuthArgs) -> Result<Owner, Box<dyn Error>> {
        Ok(self.config.token_table()?.resolve_owner(&auth.token)?)
    }
}

/// File name of the upload, used as the display name when none is given.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
