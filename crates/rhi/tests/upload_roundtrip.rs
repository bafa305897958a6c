//! GPU round-trip tests for the staging uploader.
//!
//! These need a Vulkan loader and a device with a graphics queue. Without
//! one they print a skip notice and pass.

use std::sync::Arc;

use toybox_core::ValidationMode;
use toybox_rhi::buffer::BufferUsage;
use toybox_rhi::device::Device;
use toybox_rhi::instance::{Instance, InstanceDesc};
use toybox_rhi::physical_device::select_physical_device;
use toybox_rhi::upload::{TextureUpload, Uploader};
use toybox_rhi::vk;

fn headless_device() -> Option<(Instance, Arc<Device>)> {
    let desc = InstanceDesc {
        application_name: "toybox-rhi-tests".to_string(),
        validation: ValidationMode::Disabled,
    };

    let instance = match Instance::new(&desc, &[]) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Skipping test: Vulkan unavailable ({e})");
            return None;
        }
    };

    let physical = match select_physical_device(&instance, None) {
        Ok(physical) => physical,
        Err(e) => {
            eprintln!("Skipping test: no suitable GPU ({e})");
            return None;
        }
    };

    match Device::new_headless(&instance, &physical) {
        Ok(device) => Some((instance, device)),
        Err(e) => {
            eprintln!("Skipping test: device creation failed ({e})");
            None
        }
    }
}

#[test]
fn test_vertex_bytes_round_trip() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let uploader = Uploader::new(device).unwrap();

    let bytes: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
    let buffer = uploader.upload_buffer(&bytes, BufferUsage::Vertex).unwrap();

    assert_eq!(buffer.size(), bytes.len() as u64);
    assert_eq!(uploader.read_back_buffer(&buffer).unwrap(), bytes);
}

#[test]
fn test_index_bytes_round_trip() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let uploader = Uploader::new(device).unwrap();

    let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
    let buffer = uploader
        .upload_buffer(bytemuck::cast_slice(&indices), BufferUsage::Index)
        .unwrap();

    let read = uploader.read_back_buffer(&buffer).unwrap();
    assert_eq!(bytemuck::cast_slice::<u8, u32>(&read), &indices);
}

#[test]
fn test_texture_upload_builds_mip_chain() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let uploader = Uploader::new(device).unwrap();

    let pixels = vec![200u8; 16 * 8 * 4];
    let image = uploader
        .upload_image(&TextureUpload {
            pixels: &pixels,
            width: 16,
            height: 8,
            format: vk::Format::R8G8B8A8_UNORM,
            mip_levels: 5,
        })
        .unwrap();

    assert_eq!(image.mip_levels(), 5);
    assert_eq!(image.extent(), vk::Extent2D { width: 16, height: 8 });
}

#[test]
fn test_texture_upload_rejects_short_pixel_buffer() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let uploader = Uploader::new(device).unwrap();

    let pixels = vec![0u8; 10];
    let err = uploader
        .upload_image(&TextureUpload {
            pixels: &pixels,
            width: 2,
            height: 2,
            format: vk::Format::R8G8B8A8_UNORM,
            mip_levels: 1,
        })
        .err()
        .unwrap();

    assert!(err.is_fatal());
}
