use dronelink_frame::{FrameConfig, HEADER_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("dronelink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let config = FrameConfig::default();
    println!("name: dronelink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("DRONELINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("DRONELINK_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("frame_header: {HEADER_SIZE} bytes (width, height, payload_size as native-endian i32)");
    println!("pixel_format: rgb8");
    if let Ok(capacity) = config.capacity() {
        println!(
            "default_region: {}x{} max, {capacity} bytes",
            config.max_width, config.max_height
        );
    }

    Ok(SUCCESS)
}
