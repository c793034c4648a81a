use std::{io::BufRead, sync::Arc, thread};

use rgss_audio::{
    audio::{AudioContext, HeadlessOutput, LocalFileSystem, Mixer, SoftBackend, SyncPoint},
    common::{
        banner::{BannerInfo, print_banner},
        logger,
        types::AnyResult,
    },
    configs::Config,
    script::{Audio, Command},
};
use tracing::{error, info, warn};

/// Whatever drives `SoftBackend::render`; dropping it stops output.
enum Output {
    Headless(HeadlessOutput),
    #[cfg(feature = "device")]
    Device(rgss_audio::audio::backend::DeviceOutput),
}

impl Output {
    fn start(backend: &Arc<SoftBackend>) -> AnyResult<Self> {
        #[cfg(feature = "device")]
        match rgss_audio::audio::backend::DeviceOutput::start(backend.clone()) {
            Ok(device) => return Ok(Output::Device(device)),
            Err(e) => warn!("{}, falling back to headless output", e),
        }

        Ok(Output::Headless(HeadlessOutput::start(backend.clone())?))
    }

    fn describe(&self) -> String {
        match self {
            Output::Headless(_) => "headless".to_string(),
            #[cfg(feature = "device")]
            Output::Device(device) => device.device_name().to_string(),
        }
    }
}

fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);

    let backend = Arc::new(SoftBackend::new(
        config.audio.output_rate,
        config.audio.max_voices,
    ));
    let output = Output::start(&backend)?;

    print_banner(&BannerInfo::new(
        output.describe(),
        config.audio.bgm_track_count,
    ));

    let ctx = AudioContext {
        backend,
        fs: Arc::new(LocalFileSystem::from_config(&config.filesystem)),
        sync: Arc::new(SyncPoint::new()),
    };
    let audio = Audio::new(Arc::new(Mixer::new(ctx, &config.audio)?));

    let (tx, rx) = flume::unbounded::<String>();
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    info!("Ready for commands, 'quit' to exit");

    for line in rx.iter() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let cmd = match line.parse::<Command>() {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };
        if cmd == Command::Quit {
            break;
        }

        match audio.execute(cmd) {
            Ok(Some(reply)) => println!("{}", reply),
            Ok(None) => {}
            Err(e) => error!("{}", e),
        }
    }

    // parked workers could not be joined on drop
    audio.resume();
    audio.reset();
    info!("Shutting down");

    drop(audio);
    drop(output);
    Ok(())
}
