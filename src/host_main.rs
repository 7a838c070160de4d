use anyhow::Result;
use clap::Parser;
use mora::{
    host::{args::HostArgs, start_host},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};
use tracing::{error, info};

fn main() -> Result<()> {
    run(HostArgs::parse())
}

fn run(args: HostArgs) -> Result<()> {
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(HOST_PREFIX, &app_dir, args.log, args.log_console)?;
    info!(
        "Host launched for {}",
        args.origin.as_deref().unwrap_or("unknown origin")
    );

    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(start_host(app_dir, args.backend));
    // Reading stdin parks a blocking thread that only returns on the next byte.
    runtime.shutdown_background();

    result.inspect_err(|e| error!("Host failed {e:?}"))
}
