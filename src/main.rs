//! bucketfs daemon entry point

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use bucketfs::config::{Config, MountConfig, StoreConfig};
use bucketfs::fuse::FuseOptions;
use bucketfs::mount::MountManager;
use bucketfs::store::s3::S3Store;
use bucketfs::store::ObjectStore;
use bucketfs::tree::Tree;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: bucketfs <config.yaml>");
    eprintln!();
    eprintln!("bucketfs - mount an object-store bucket as a read-only filesystem");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to configuration file");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  bucketfs /etc/bucketfs/config.yaml");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("bucketfs starting");
    info!("Loaded configuration from {:?}", config_path);

    let manager = Arc::new(MountManager::new());

    // Installed before mounting so a signal during startup still unmounts;
    // the stored permit wakes the wait below once all mounts are up
    let shutdown = Arc::new(Notify::new());
    let notify = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        notify.notify_one();
    })?;

    // Any failure from here until all mounts are up aborts startup
    for mount_config in &config.mounts {
        if let Err(e) = setup_mount(&manager, mount_config).await {
            error!("Failed to mount {:?}: {}", mount_config.path, e);
            manager.unmount_all();
            std::process::exit(1);
        }
    }

    info!("{} filesystem(s) mounted successfully", manager.count());
    info!("Press Ctrl+C to unmount and exit");

    shutdown.notified().await;

    info!("Shutting down");
    manager.unmount_all();
    info!("All filesystems unmounted, exiting");

    Ok(())
}

/// Connect the store for one mount, check it is reachable and mount it
async fn setup_mount(
    manager: &MountManager,
    mount_config: &MountConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Setting up mount at {:?}", mount_config.path);

    let store: Arc<dyn ObjectStore> = match &mount_config.store {
        StoreConfig::S3(s3_config) => {
            let s3 = S3Store::new(s3_config.clone()).await?;
            s3.check().await?;
            info!("Connected to bucket {}", s3_config.bucket);
            Arc::new(s3)
        }
    };

    if !mount_config.path.exists() {
        debug!("Creating mount point directory {:?}", mount_config.path);
        std::fs::create_dir_all(&mount_config.path)?;
    }

    let tree = Arc::new(Tree::new(store, mount_config.content));
    debug!(
        "Content strategy for {:?}: {:?}",
        mount_config.path,
        tree.strategy()
    );
    let options = FuseOptions {
        attr_ttl: mount_config.attr_ttl,
        uid: mount_config.uid,
        gid: mount_config.gid,
    };

    manager.mount(
        mount_config.path.clone(),
        tree,
        options,
        mount_config.allow_other,
    )?;
    Ok(())
}
