use wgpu::{BufferDescriptor, BufferUsages, Extent3d};

use super::error::{DriverError, DriverErrorKind, DriverErrors, ResourceError};
use super::render_target::RenderTarget;
use super::resources::ResourceProvider;

/// Copies an RGBA8 render target to the CPU, blocking until the map lands.
/// Returns tightly packed rows.
pub fn read_target(
    resources: &ResourceProvider,
    target: &RenderTarget,
) -> Result<Vec<u8>, ResourceError> {
    let unpadded_bytes_per_row = target.width * 4;
    let padded_bytes_per_row =
        align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let buffer_size = u64::from(padded_bytes_per_row) * u64::from(target.height);

    let staging = resources.checked("readback", |device| {
        let staging = device.create_buffer(&BufferDescriptor {
            label: Some("readback-staging"),
            size: buffer_size,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback-encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(target.height),
                },
            },
            Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        resources.queue.submit(std::iter::once(encoder.finish()));
        staging
    })?;

    let (tx, rx) = crossbeam_channel::bounded(1);
    staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    // Blocks until the copy completes and the map callback has run.
    resources
        .device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| poll_failed(&e))?;
    let mapped = match rx.try_recv() {
        Ok(result) => result,
        Err(crossbeam_channel::TryRecvError::Empty) => {
            return Err(readback_failed("map callback did not run after wait"));
        }
        Err(crossbeam_channel::TryRecvError::Disconnected) => {
            return Err(readback_failed("map callback dropped"));
        }
    };
    mapped.map_err(|e| readback_failed(&e.to_string()))?;

    let data = {
        let mapped = staging.slice(..).get_mapped_range();
        strip_row_padding(
            &mapped,
            padded_bytes_per_row as usize,
            unpadded_bytes_per_row as usize,
            target.height as usize,
        )
    };
    staging.unmap();
    Ok(data)
}

fn readback_failed(message: &str) -> ResourceError {
    ResourceError::Driver(DriverErrors(vec![DriverError {
        kind: DriverErrorKind::Validation,
        label: "readback".into(),
        message: message.to_string(),
    }]))
}

fn poll_failed(err: &wgpu::PollError) -> ResourceError {
    readback_failed(&format!("device poll failed: {err}"))
}

fn strip_row_padding(mapped: &[u8], padded: usize, unpadded: usize, rows: usize) -> Vec<u8> {
    if padded == unpadded {
        return mapped[..unpadded * rows].to_vec();
    }
    let mut out = Vec::with_capacity(unpadded * rows);
    for row in 0..rows {
        let start = row * padded;
        out.extend_from_slice(&mapped[start..start + unpadded]);
    }
    out
}

/// Align `value` up to the next multiple of `alignment`.
fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_row_alignment() {
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(257, 256), 512);
    }

    #[test]
    fn poll_errors_become_readback_driver_errors() {
        let ResourceError::Driver(errors) = poll_failed(&wgpu::PollError::Timeout) else {
            panic!("expected a driver error");
        };
        assert_eq!(errors.0.len(), 1);
        assert_eq!(errors.0[0].label, "readback");
        assert!(errors.0[0].message.starts_with("device poll failed: "));
        assert!(errors.0[0].message.contains("timed out"));
    }

    #[test]
    fn strip_padding_keeps_pixel_bytes() {
        // 2 rows of 3 bytes, padded to 4
        let mapped = [1, 2, 3, 0, 4, 5, 6, 0];
        assert_eq!(strip_row_padding(&mapped, 4, 3, 2), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(strip_row_padding(&mapped, 4, 4, 2), mapped.to_vec());
    }
}
