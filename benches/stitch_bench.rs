use criterion::{criterion_group, criterion_main, Criterion};
use rfcapture::geometry::Rect;
use rfcapture::host::SyntheticPage;
use rfcapture::output::encode_jpeg;
use rfcapture::{CaptureConfig, CaptureSession};

fn config() -> CaptureConfig {
    CaptureConfig {
        settle_delay_ms: 0,
        ..Default::default()
    }
}

fn bench_stitch(c: &mut Criterion) {
    c.bench_function("stitch_6_tiles", |b| {
        b.iter(|| {
            let mut page = SyntheticPage::new(1600.0, 2000.0, 800.0, 600.0);
            let mut session = CaptureSession::new(Rect::new(0.0, 0.0, 1600.0, 1800.0), config()).unwrap();
            session.run_raw(&mut page).unwrap()
        })
    });

    c.bench_function("stitch_hidpi_4_tiles", |b| {
        b.iter(|| {
            let mut page = SyntheticPage::new(1200.0, 1200.0, 600.0, 600.0).with_device_pixel_ratio(2.0);
            let mut session = CaptureSession::new(Rect::new(0.0, 0.0, 1200.0, 1200.0), config()).unwrap();
            session.run_raw(&mut page).unwrap()
        })
    });
}

fn bench_encode(c: &mut Criterion) {
    let mut page = SyntheticPage::new(1600.0, 2000.0, 800.0, 600.0);
    let mut session = CaptureSession::new(Rect::new(0.0, 0.0, 1600.0, 1800.0), config()).unwrap();
    let composited = session.run_raw(&mut page).unwrap();

    c.bench_function("encode_jpeg_1600x1800", |b| {
        b.iter(|| encode_jpeg(&composited.image, 90).unwrap())
    });
}

criterion_group!(benches, bench_stitch, bench_encode);
criterion_main!(benches);
