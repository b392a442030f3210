use dronelink_frame::{FrameRead, FrameReader, HEADER_SIZE};
use dronelink_shm::{SharedRegion, ShmError};
use serde::Serialize;

use crate::cmd::ProbeArgs;
use crate::exit::{frame_error, shm_error, CliResult, SUCCESS};
use crate::output::{print_fields, print_json, print_pretty, OutputFormat};

#[derive(Serialize)]
struct HeaderOutput {
    width: i32,
    height: i32,
    payload_size: i32,
}

#[derive(Serialize)]
struct ProbeOutput {
    region: String,
    capacity: usize,
    max_payload: usize,
    header: Option<HeaderOutput>,
    status: &'static str,
    detail: Option<String>,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    // Existence is checked without mapping the region.
    let exists =
        SharedRegion::exists(&args.region).map_err(|err| shm_error("attach failed", err))?;
    if !exists {
        return Err(shm_error(
            "attach failed",
            ShmError::NotFound {
                name: args.region.clone(),
            },
        ));
    }

    let mut reader =
        FrameReader::attach(&args.region).map_err(|err| frame_error("attach failed", err))?;

    let header = reader.header().map(|h| HeaderOutput {
        width: h.width,
        height: h.height,
        payload_size: h.payload_size,
    });
    let (status, detail) = match reader.read() {
        FrameRead::Frame(frame) => (
            "frame",
            Some(format!("{}x{} rgb8", frame.width(), frame.height())),
        ),
        FrameRead::Empty => ("empty", None),
        FrameRead::Invalid(reason) => ("invalid", Some(reason.to_string())),
    };

    let capacity = reader.capacity();
    let out = ProbeOutput {
        region: reader.name().unwrap_or(&args.region).to_string(),
        capacity,
        max_payload: capacity.saturating_sub(HEADER_SIZE),
        header,
        status,
        detail,
    };
    reader.detach();

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_fields(&rows(&out)),
        OutputFormat::Pretty => print_pretty(&rows(&out)),
    }
    Ok(SUCCESS)
}

fn rows(out: &ProbeOutput) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("region", out.region.clone()),
        ("capacity", out.capacity.to_string()),
        ("max_payload", out.max_payload.to_string()),
    ];
    if let Some(header) = &out.header {
        rows.push((
            "header",
            format!(
                "{}x{} size={}",
                header.width, header.height, header.payload_size
            ),
        ));
    }
    rows.push(("status", out.status.to_string()));
    if let Some(detail) = &out.detail {
        rows.push(("detail", detail.clone()));
    }
    rows
}
