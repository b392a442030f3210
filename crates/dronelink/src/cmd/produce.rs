use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dronelink_frame::FrameWriter;
use dronelink_video::Producer;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, ProduceArgs};
use crate::exit::{frame_error, video_error, CliResult, SUCCESS};

/// Publish frames until SIGINT/SIGTERM, then unlink the region.
pub fn run(args: ProduceArgs) -> CliResult<i32> {
    let config = args.producer.producer_config()?;
    let frame_config = args.producer.frame_config()?;
    let source = args
        .producer
        .source
        .open()
        .map_err(|err| video_error("capture source failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let writer = FrameWriter::create(&args.region, frame_config)
        .map_err(|err| frame_error("create region failed", err))?;
    info!(
        region = %args.region,
        source = %args.producer.source,
        capacity = writer.region().capacity(),
        "frame region created"
    );

    let mut producer = Producer::new(source, writer, config);
    let stats = producer.run(&running);
    drop(producer);

    info!(
        region = %args.region,
        published = stats.published,
        snapshots = stats.snapshots,
        "frame region released"
    );
    Ok(SUCCESS)
}
