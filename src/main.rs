/*
 *  main.rs
 *
 *  Vitrine - put it on glass
 *	(c) 2020-26 Stuart Hunter
 *
 *	TODO: load themes from disk once the theme compiler lands
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use std::time::Duration;

use anyhow::Context;
use env_logger::Env;
use log::{info, warn};

use vitrine::canvas::Rgb;
use vitrine::config;
use vitrine::engine::{self, EngineConfig};
use vitrine::proto::{self, CapabilityModel, MemoryTransport, Orientation, Revision};
use vitrine::stats::{ClockSource, MachineSource, StatSource};
use vitrine::theme::{DisplaySettings, Theme};
use vitrine::transmitter::Reconnector;
use vitrine::widget::{
    Background, BarDirection, BarWidget, FontChoice, GaugeWidget, GraphWidget, TextAlign,
    TextStyle, TextWidget, Widget, WidgetKind,
};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

const ACCENT: Rgb = Rgb::new(64, 200, 255);
const DIM: Rgb = Rgb::new(90, 90, 90);

fn text_style(font: FontChoice, align: TextAlign) -> TextStyle {
    TextStyle {
        font,
        color: Rgb::WHITE,
        background: Background::Solid(Rgb::BLACK),
        align,
        decimals: 0,
        prefix: String::new(),
        suffix: String::new(),
        show_unit: false,
    }
}

/// Built-in monitoring theme, laid out for the panel's portrait
/// resolution. Stands in until themes are compiled from files.
fn demo_theme(caps: &CapabilityModel) -> Theme {
    let (w, h) = (caps.native_width, caps.native_height);
    let m = w / 16;
    let mut widgets = Vec::new();
    let mut y = m;

    widgets.push(Widget {
        label: "clock".into(),
        stat_key: Some(ClockSource::TIME.into()),
        interval: Duration::from_millis(500),
        fallback: "--:--:--".into(),
        kind: WidgetKind::Text(TextWidget {
            x: m,
            y,
            w: w - 2 * m,
            h: 34,
            style: text_style(FontChoice::XLarge, TextAlign::Center),
        }),
    });
    y += 40;

    widgets.push(Widget {
        label: "date".into(),
        stat_key: Some(ClockSource::DATE.into()),
        interval: Duration::from_secs(30),
        fallback: "-".into(),
        kind: WidgetKind::Text(TextWidget {
            x: m,
            y,
            w: w - 2 * m,
            h: 18,
            style: text_style(FontChoice::Medium, TextAlign::Center),
        }),
    });
    y += 24;

    let radius = (w - 2 * m) / 4;
    widgets.push(Widget {
        label: "cpu load gauge".into(),
        stat_key: Some(MachineSource::CPU_LOAD.into()),
        interval: Duration::from_secs(2),
        fallback: "?".into(),
        kind: WidgetKind::RadialGauge(GaugeWidget {
            cx: w / 2,
            cy: y + radius,
            radius,
            line_width: 10,
            min: 0.0,
            max: 100.0,
            start_deg: 120.0,
            end_deg: 420.0,
            step_count: 20,
            step_sep: 3.0,
            clockwise: true,
            color: ACCENT,
            rest_color: Some(DIM),
            background: Background::Solid(Rgb::BLACK),
        }),
    });
    y += 2 * radius + 8;

    let mut temp_style = text_style(FontChoice::Medium, TextAlign::Center);
    temp_style.prefix = "CPU ".into();
    temp_style.show_unit = true;
    widgets.push(Widget {
        label: "cpu temp".into(),
        stat_key: Some(MachineSource::CPU_TEMP.into()),
        interval: Duration::from_secs(2),
        fallback: "CPU -".into(),
        kind: WidgetKind::Text(TextWidget {
            x: m,
            y,
            w: w - 2 * m,
            h: 18,
            style: temp_style,
        }),
    });
    y += 24;

    widgets.push(Widget {
        label: "memory bar".into(),
        stat_key: Some(MachineSource::MEM_USED_PCT.into()),
        interval: Duration::from_secs(2),
        fallback: "-".into(),
        kind: WidgetKind::LinearBar(BarWidget {
            x: m,
            y,
            w: w - 2 * m,
            h: 20,
            min: 0.0,
            max: 100.0,
            direction: BarDirection::Horizontal,
            color: ACCENT,
            background: Background::Solid(Rgb::BLACK),
            outline: Some(Rgb::WHITE),
        }),
    });
    y += 26;

    let mut mem_style = text_style(FontChoice::Small, TextAlign::Center);
    mem_style.prefix = "free ".into();
    mem_style.show_unit = true;
    widgets.push(Widget {
        label: "memory free".into(),
        stat_key: Some(MachineSource::MEM_AVAILABLE.into()),
        interval: Duration::from_secs(5),
        fallback: "free -".into(),
        kind: WidgetKind::Text(TextWidget {
            x: m,
            y,
            w: w - 2 * m,
            h: 16,
            style: mem_style,
        }),
    });
    y += 22;

    let graph_h = h - y - m - 24;
    widgets.push(Widget {
        label: "cpu load graph".into(),
        stat_key: Some(MachineSource::CPU_LOAD.into()),
        interval: Duration::from_secs(1),
        fallback: "?".into(),
        kind: WidgetKind::LineGraph(GraphWidget {
            x: m,
            y,
            w: w - 2 * m,
            h: graph_h,
            history: 120,
            autoscale: false,
            min: 0.0,
            max: 100.0,
            color: ACCENT,
            background: Background::Solid(Rgb::BLACK),
            outline: Some(DIM),
        }),
    });
    y += graph_h + 8;

    let mut up_style = text_style(FontChoice::Small, TextAlign::Center);
    up_style.prefix = "up ".into();
    up_style.decimals = 1;
    up_style.show_unit = true;
    widgets.push(Widget {
        label: "uptime".into(),
        stat_key: Some(MachineSource::UPTIME.into()),
        interval: Duration::from_secs(60),
        fallback: "up -".into(),
        kind: WidgetKind::Text(TextWidget {
            x: m,
            y,
            w: w - 2 * m,
            h: 16,
            style: up_style,
        }),
    });

    Theme {
        display: DisplaySettings {
            width: w,
            height: h,
            orientation: Orientation::Portrait,
            brightness: 80,
            led_color: None,
            wallpaper: None,
            background: Rgb::BLACK,
        },
        widgets,
    }
}

async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut hup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    tokio::select! {
        _ = term.recv() => info!("SIGTERM received"),
        _ = int.recv() => info!("SIGINT received"),
        _ = hup.recv() => info!("SIGHUP received"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    let level = cfg.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
    info!(
        "Vitrine {} (built {})",
        env!("CARGO_PKG_VERSION"),
        BUILD_DATE
    );

    let panel = cfg.panel.unwrap_or_default();
    let revision = panel.revision.unwrap_or(Revision::A);
    let port = panel.port.unwrap_or_else(|| "AUTO".into());
    let baud = panel.baud.unwrap_or(115_200);

    let mut theme = demo_theme(CapabilityModel::for_revision(revision));
    if let Some(brightness) = panel.brightness {
        theme.display.brightness = brightness;
    }

    let sources: Vec<Box<dyn StatSource>> = vec![
        Box::new(MachineSource::new(Duration::from_secs(2))),
        Box::new(ClockSource::new(Duration::from_millis(500))),
    ];

    let engine_cfg = EngineConfig::default();
    let handle = if port.eq_ignore_ascii_case("sim") {
        if revision != Revision::A {
            warn!("the in-memory panel only answers as revision A");
        }
        let (io, _panel) = MemoryTransport::new();
        let reconnect: Reconnector = Box::new(move || {
            let (io, _panel) = MemoryTransport::new();
            proto::connect(revision, Box::new(io))
        });
        engine::start(theme, revision, Box::new(io), sources, engine_cfg, reconnect).await?
    } else {
        engine::start_serial(theme, revision, &port, baud, sources, engine_cfg).await?
    };

    wait_for_signal().await?;
    handle.stop().await;
    Ok(())
}
