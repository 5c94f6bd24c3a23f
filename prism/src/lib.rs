mod app;
mod engine;
mod main_loop;

pub use app::{App, RenderContext, RenderableApp};
pub use engine::Engine;
pub use prism_core::cli::EngineArgs;
pub use prism_core::config::{EngineConfig, GraphicsApi};

pub use paste::paste;

macro_rules! module_facade {
    ($name:ident) => {
        $crate::paste!{
            pub mod $name {
                pub use [<prism_ $name>]::*;
            }
        }
    };
}

module_facade!(core);
module_facade!(rhi);
module_facade!(renderer);

use prism_rhi::{Backend, Vulkan};
use crate::main_loop::{run_headless, EngineLoop};

/// Frames a headless run renders when the app never asks to exit.
pub const HEADLESS_FRAME_LIMIT: u64 = 120;

/// Parse the command line, set up logging and profiling and run `A` on the configured backend.
pub fn launch<A: RenderableApp>() -> Result<(), anyhow::Error> {
    let args = EngineArgs::parse_args();
    prism_core::log::initialize(args.log_level.into())?;

    let config = args.resolve_config()?;
    let _profiler = config
        .profiler_port
        .map(prism_core::profile::initialize)
        .transpose()?;

    log::info!("Launching with {} backend", config.graphics_api);
    let app = A::new(&args, &config)?;
    match config.graphics_api {
        GraphicsApi::Vulkan => run_windowed::<A, Vulkan>(app, config),
        #[cfg(windows)]
        GraphicsApi::DirectX12 => run_windowed::<A, prism_rhi::DirectX12>(app, config),
        #[cfg(not(windows))]
        GraphicsApi::DirectX12 => anyhow::bail!("DirectX12 is only available on Windows"),
        GraphicsApi::Headless => run_headless::<A>(app, &config, HEADLESS_FRAME_LIMIT).map(|_| ()),
    }
}

fn run_windowed<A: RenderableApp, B: Backend>(app: A, config: EngineConfig) -> Result<(), anyhow::Error> {
    let main_loop = EngineLoop::<A, B>::new(app, config)?;
    main_loop.run()
}

/// Run `A` without a window on the headless backend for at most `frame_limit` frames.
/// Returns the number of rendered frames.
pub fn launch_headless<A: RenderableApp>(
    args: &EngineArgs,
    config: &EngineConfig,
    frame_limit: u64,
) -> Result<u64, anyhow::Error> {
    let app = A::new(args, config)?;
    run_headless::<A>(app, config, frame_limit)
}
