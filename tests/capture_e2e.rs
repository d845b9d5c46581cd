//! End-to-end tests for the capture pipeline against the simulated sensor.
//!
//! Covers frame ownership, the sensor bring-up fallback chain, bounded
//! arena errors and the stored container formats.

use retrocam::app::{bring_up_sensor, SENSOR_BRINGUP};
use retrocam::memory::{HostMemory, MemoryPool, MemoryRegion};
use retrocam::pipeline::{
    CaptureError, CaptureMode, CapturePipeline, PipelineSettings, ProcessingError,
};
use retrocam::sensor::{PixelFormat, Scene, SensorConfig, SensorDriver, SimulatedSensor};
use retrocam::storage::encode_for_storage;
use retrocam::tone::ToneTables;

fn sensor(format: PixelFormat, scene: Scene) -> SimulatedSensor {
    let mut s = SimulatedSensor::new(scene);
    s.init(&SensorConfig::qqvga(format)).unwrap();
    s
}

fn pipeline(pool: &dyn MemoryPool) -> CapturePipeline {
    CapturePipeline::new(pool, PipelineSettings::default(), ToneTables::default())
}

// ==================== Frame Ownership ====================

#[test]
fn test_every_mode_and_format_leaves_no_frame_owned() {
    let pool = HostMemory::new(Some(1 << 20));
    let mut p = pipeline(&pool);

    for format in [PixelFormat::Jpeg, PixelFormat::Rgb565, PixelFormat::Rgb888] {
        let mut s = sensor(format, Scene::Gradient);
        let stats = s.stats();
        for mode in CaptureMode::ALL {
            let image = p
                .capture(mode, &mut s)
                .unwrap_or_else(|e| panic!("{} / {}: {}", format, mode, e));
            let info = image.release(&mut s);
            assert_eq!(info.mode, mode);
            assert_eq!(stats.outstanding(), 0, "{} / {}", format, mode);
        }
        assert_eq!(stats.acquired(), CaptureMode::ALL.len());
    }
}

#[test]
fn test_processed_modes_release_before_returning() {
    let pool = HostMemory::new(None);
    let mut p = pipeline(&pool);
    let mut s = sensor(PixelFormat::Rgb565, Scene::Uniform(128));
    let stats = s.stats();

    let image = p.capture(CaptureMode::Stylized, &mut s).unwrap();
    assert!(!image.holds_frame());
    assert_eq!(stats.outstanding(), 0);
    assert_eq!(image.len(), 160 * 120);
}

#[test]
fn test_errors_release_the_frame() {
    let pool = HostMemory::new(None);
    let mut p = pipeline(&pool);

    let mut s = sensor(PixelFormat::Yuv422, Scene::Uniform(128));
    let stats = s.stats();
    let err = p.capture(CaptureMode::Stylized, &mut s).unwrap_err();
    assert!(matches!(
        err,
        CaptureError::Processing(ProcessingError::UnsupportedFormat(PixelFormat::Yuv422))
    ));
    assert_eq!(stats.outstanding(), 0);
}

#[test]
fn test_oversized_frame_is_rejected_not_truncated() {
    let pool = HostMemory::new(None);
    let mut p = pipeline(&pool);
    let mut s = SimulatedSensor::new(Scene::Uniform(128));
    s.init(&SensorConfig {
        format: PixelFormat::Rgb888,
        width: 640,
        height: 480,
        jpeg_quality: 80,
    })
    .unwrap();
    let stats = s.stats();

    let err = p.capture(CaptureMode::Night, &mut s).unwrap_err();
    assert!(matches!(
        err,
        CaptureError::Processing(ProcessingError::FrameTooLarge {
            width: 640,
            height: 480,
            ..
        })
    ));
    assert_eq!(stats.outstanding(), 0);
    assert!(p.last_output().is_none());
}

#[test]
fn test_normal_mode_accepts_oversized_frames() {
    // Raw frames never touch the arena
    let pool = HostMemory::new(None);
    let mut p = pipeline(&pool);
    let mut s = SimulatedSensor::new(Scene::Uniform(128));
    s.init(&SensorConfig {
        format: PixelFormat::Jpeg,
        width: 640,
        height: 480,
        jpeg_quality: 50,
    })
    .unwrap();

    let image = p.capture(CaptureMode::Normal, &mut s).unwrap();
    assert_eq!(image.width(), 640);
    image.release(&mut s);
}

// ==================== Fallback Chain ====================

#[test]
fn test_rgb_init_failure_falls_back_to_jpeg() {
    let pool = HostMemory::new(Some(1 << 20));
    let mut s = SimulatedSensor::new(Scene::Gradient).fail_init_for(PixelFormat::Rgb565);
    let stats = s.stats();

    let outcome = bring_up_sensor(
        &mut s,
        &SENSOR_BRINGUP,
        &SensorConfig::default(),
        pool.has_external(),
        true,
    )
    .unwrap();
    assert_eq!(outcome.format, PixelFormat::Jpeg);
    assert!(outcome.fallback_to_jpeg);
    assert_eq!(stats.init_calls(), 2);

    let mut p = pipeline(&pool);
    let image = p.capture(CaptureMode::Normal, &mut s).unwrap();
    assert_eq!(image.extension(), "jpg");
    assert_eq!(&image.data()[..2], &[0xFF, 0xD8]);
    image.release(&mut s);
    assert_eq!(stats.outstanding(), 0);
}

#[test]
fn test_missing_external_ram_skips_rgb() {
    let pool = HostMemory::new(None);
    let mut s = SimulatedSensor::new(Scene::Gradient);
    let stats = s.stats();

    let outcome = bring_up_sensor(
        &mut s,
        &SENSOR_BRINGUP,
        &SensorConfig::default(),
        pool.has_external(),
        true,
    )
    .unwrap();
    assert_eq!(outcome.format, PixelFormat::Jpeg);
    assert!(outcome.fallback_to_jpeg);
    assert_eq!(stats.init_calls(), 1);
}

#[test]
fn test_jpeg_fallback_still_stylizes() {
    let pool = HostMemory::new(None);
    let mut p = pipeline(&pool);
    let mut s = sensor(PixelFormat::Jpeg, Scene::Gradient);

    let image = p.capture(CaptureMode::Stylized, &mut s).unwrap();
    assert!(image.is_processed());
    assert!(image.data().iter().all(|&v| v == 0 || v == 255));
    // Gradient: left edge dark, right edge bright
    assert_eq!(image.data()[0], 0);
    assert_eq!(image.data()[159], 255);
}

// ==================== Scenario ====================

#[test]
fn test_stylized_mid_gray_is_pinned() {
    let pool = HostMemory::new(None);
    let mut p = pipeline(&pool);
    let mut s = sensor(PixelFormat::Rgb888, Scene::Uniform(128));

    let first: Vec<u8> = p.capture(CaptureMode::Stylized, &mut s).unwrap().data().to_vec();
    let lit = first.iter().filter(|&&v| v == 255).count();
    assert_eq!(lit, 12_600);

    let second: Vec<u8> = p.capture(CaptureMode::Stylized, &mut s).unwrap().data().to_vec();
    assert_eq!(first, second);
}

// ==================== Arena & Memory ====================

#[test]
fn test_arena_prefers_external_ram() {
    let pool = HostMemory::new(Some(1 << 20));
    let p = pipeline(&pool);
    assert_eq!(p.arena_region(), Some(MemoryRegion::External));
    assert!(pool.external_free().unwrap() < 1 << 20);
}

#[test]
fn test_arena_falls_back_to_heap() {
    let pool = HostMemory::new(Some(1024));
    let p = pipeline(&pool);
    assert_eq!(p.arena_region(), Some(MemoryRegion::Heap));
    assert_eq!(pool.external_free(), Some(1024));
}

#[test]
fn test_no_memory_means_not_ready() {
    let pool = HostMemory::new(None).with_heap_budget(1024);
    let mut p = pipeline(&pool);
    assert!(!p.is_ready());

    let mut s = sensor(PixelFormat::Rgb888, Scene::Uniform(128));
    let stats = s.stats();
    let err = p.capture(CaptureMode::Stylized, &mut s).unwrap_err();
    assert!(matches!(err, CaptureError::Memory(_)));
    assert_eq!(stats.acquired(), 0);
}

// ==================== Storage Containers ====================

#[test]
fn test_stored_containers_per_mode() {
    let pool = HostMemory::new(None);
    let mut p = pipeline(&pool);

    let mut s = sensor(PixelFormat::Jpeg, Scene::Gradient);
    let image = p.capture(CaptureMode::Normal, &mut s).unwrap();
    let encoded = encode_for_storage(image.info(), image.data()).unwrap();
    image.release(&mut s);
    assert_eq!(encoded.extension, "jpg");

    let image = p.capture(CaptureMode::Night, &mut s).unwrap();
    let encoded = encode_for_storage(image.info(), image.data()).unwrap();
    assert_eq!(encoded.extension, "bmp");
    assert_eq!(&encoded.bytes[..2], b"BM");

    let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_luma8();
    assert_eq!(decoded.dimensions(), (160, 120));
}
