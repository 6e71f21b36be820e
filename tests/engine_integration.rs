/*
 *  tests/engine_integration.rs
 *
 *  End-to-end engine tests against the in-memory panel
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 */

use std::time::Duration;

use vitrine::canvas::Rgb;
use vitrine::engine::{self, EngineConfig};
use vitrine::proto::{MemoryTransport, Orientation, ProtoError, Revision};
use vitrine::stats::{SimulatedSource, StatSource};
use vitrine::theme::{DisplaySettings, Theme, ThemeError};
use vitrine::transmitter::Reconnector;
use vitrine::widget::{
    Background, FontChoice, TextAlign, TextStyle, TextWidget, Widget, WidgetKind,
};

const BITMAP_CMD: u8 = 197;

fn text_widget(label: &str, key: &str, x: u16, y: u16, interval_ms: u64) -> Widget {
    Widget {
        label: label.into(),
        stat_key: Some(key.into()),
        interval: Duration::from_millis(interval_ms),
        fallback: "-".into(),
        kind: WidgetKind::Text(TextWidget {
            x,
            y,
            w: 80,
            h: 20,
            style: TextStyle {
                font: FontChoice::Small,
                color: Rgb::WHITE,
                background: Background::Solid(Rgb::BLACK),
                align: TextAlign::Left,
                decimals: 2,
                prefix: String::new(),
                suffix: String::new(),
                show_unit: false,
            },
        }),
    }
}

fn test_theme(widgets: Vec<Widget>) -> Theme {
    Theme {
        display: DisplaySettings {
            width: 320,
            height: 480,
            orientation: Orientation::Portrait,
            brightness: 60,
            led_color: None,
            wallpaper: None,
            background: Rgb::BLACK,
        },
        widgets,
    }
}

fn no_reconnect() -> Reconnector {
    Box::new(|| Err(ProtoError::NoPortFound))
}

/// Reference bit packing for the revision A command header.
fn rev_a_header(cmd: u8, x: u16, y: u16, ex: u16, ey: u16) -> Vec<u8> {
    vec![
        (x >> 2) as u8,
        (((x & 3) << 6) as u8) | ((y >> 4) as u8),
        (((y & 15) << 4) as u8) | ((ex >> 6) as u8),
        (((ex & 63) << 2) as u8) | ((ey >> 8) as u8),
        (ey & 255) as u8,
        cmd,
    ]
}

#[tokio::test]
async fn engine_initializes_panel_and_flushes_full_frame_first() {
    let (io, panel) = MemoryTransport::new();

    let theme = test_theme(vec![
        text_widget("a", "sim.a", 10, 10, 40),
        text_widget("b", "sim.b", 10, 40, 40),
    ]);
    let sources: Vec<Box<dyn StatSource>> = vec![Box::new(SimulatedSource::new(
        Duration::from_millis(15),
        7,
        vec![("sim.a".into(), 0.0, 100.0), ("sim.b".into(), 0.0, 100.0)],
    ))];

    let handle = engine::start(
        theme,
        Revision::A,
        Box::new(io),
        sources,
        EngineConfig::default(),
        no_reconnect(),
    )
    .await
    .expect("engine should start");

    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.stop().await;

    let writes = panel.writes();
    assert!(!writes.is_empty());

    // Display settings go out before any frame: screen on, orientation,
    // brightness, in that order.
    assert_eq!(writes[0], rev_a_header(109, 0, 0, 0, 0), "screen on first");
    assert_eq!(writes[1][5], 121, "orientation next");
    assert_eq!(writes[2][5], 110, "brightness next");

    // The first bitmap is a full-frame resync covering the whole panel.
    let first_bitmap = writes
        .iter()
        .find(|w| w.len() == 6 && w[5] == BITMAP_CMD)
        .expect("a bitmap header was written");
    assert_eq!(first_bitmap, &rev_a_header(BITMAP_CMD, 0, 0, 319, 479));

    // Full frame payload adds up to 320*480 RGB565 pixels.
    let full_payload: usize = writes
        .iter()
        .skip_while(|w| *w != first_bitmap)
        .skip(1)
        .take_while(|w| !(w.len() == 6 && w[5] == BITMAP_CMD))
        .map(|w| w.len())
        .sum();
    assert_eq!(full_payload, 320 * 480 * 2);

    // Widgets kept refreshing with changing simulated values, so partial
    // region writes followed.
    let bitmap_count = writes
        .iter()
        .filter(|w| w.len() == 6 && w[5] == BITMAP_CMD)
        .count();
    assert!(bitmap_count > 1, "expected partial updates after the resync");
}

#[tokio::test]
async fn handshake_failure_surfaces_to_caller() {
    // Revision B expects a HELLO answer; the silent panel times out.
    let (io, panel) = MemoryTransport::new();
    let theme = test_theme(vec![text_widget("a", "sim.a", 10, 10, 50)]);

    let err = match engine::start(
        theme,
        Revision::B,
        Box::new(io),
        Vec::new(),
        EngineConfig::default(),
        no_reconnect(),
    )
    .await
    {
        Ok(_) => panic!("handshake must fail"),
        Err(e) => e,
    };

    assert!(matches!(
        err,
        engine::EngineError::Proto(ProtoError::HandshakeFailed(_))
    ));
    // Only the HELLO went out; no display traffic after the failure.
    assert_eq!(panel.writes().len(), 1);
}

#[tokio::test]
async fn invalid_theme_is_rejected_before_any_traffic() {
    let (io, panel) = MemoryTransport::new();
    // 310 + 80 > 320: out of bounds.
    let theme = test_theme(vec![text_widget("wide", "sim.a", 310, 10, 50)]);

    let err = match engine::start(
        theme,
        Revision::A,
        Box::new(io),
        Vec::new(),
        EngineConfig::default(),
        no_reconnect(),
    )
    .await
    {
        Ok(_) => panic!("validation must fail"),
        Err(e) => e,
    };

    assert!(matches!(
        err,
        engine::EngineError::Theme(ThemeError::OutOfBounds(..))
    ));
    assert!(panel.writes().is_empty());
}

#[tokio::test]
async fn unchanged_values_produce_no_extra_traffic() {
    let (io, panel) = MemoryTransport::new();

    // No sources at all: every widget renders its fallback once and then
    // never changes again.
    let theme = test_theme(vec![text_widget("a", "sim.a", 10, 10, 20)]);
    let handle = engine::start(
        theme,
        Revision::A,
        Box::new(io),
        Vec::new(),
        EngineConfig::default(),
        no_reconnect(),
    )
    .await
    .expect("engine should start");

    tokio::time::sleep(Duration::from_millis(250)).await;
    let after_settle = panel.writes().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let later = panel.writes().len();
    handle.stop().await;

    assert_eq!(
        after_settle, later,
        "no frame traffic while nothing changes"
    );
}

#[tokio::test]
async fn runtime_brightness_changes_reach_the_panel() {
    let (io, panel) = MemoryTransport::new();
    let theme = test_theme(vec![text_widget("a", "sim.a", 10, 10, 50)]);

    let handle = engine::start(
        theme,
        Revision::A,
        Box::new(io),
        Vec::new(),
        EngineConfig::default(),
        no_reconnect(),
    )
    .await
    .expect("engine should start");

    handle.set_brightness(5).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.stop().await;

    // 5% maps to an inverted level of 255 - 12 = 243 in the x field.
    let expected = rev_a_header(110, 243, 0, 0, 0);
    assert!(
        panel.writes().iter().any(|w| *w == expected),
        "brightness command should have been transmitted"
    );
}
