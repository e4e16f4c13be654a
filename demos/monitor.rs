use airtouch4::{AirTouchConfig, MessageLogMode, Poller, ServiceEvent};
use std::env;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> airtouch4::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(host) = args.get(1) else {
        eprintln!("usage: monitor <host> [--port N] [--log FILE]");
        std::process::exit(2);
    };
    let mut config = AirTouchConfig::new(host.as_str());
    if let Some(port) = flag(&args, "--port").and_then(|p| p.parse().ok()) {
        config.port = port;
    }

    let mut builder = config.service_builder()?.on_event(|event| match event {
        ServiceEvent::FullUpdate(snapshot) => {
            for ac in &snapshot.ac_statuses {
                let name = snapshot
                    .ac_ability(ac.ac_number)
                    .map(|a| a.name.as_str())
                    .unwrap_or("?");
                println!(
                    "[AC {} {name}] {:?} | mode: {:?} | fan: {:?} | setpoint {} | {:.1}\u{00b0}C",
                    ac.ac_number, ac.power, ac.mode, ac.fan_speed, ac.setpoint, ac.temperature,
                );
            }
            for zone in &snapshot.zone_statuses {
                let name = snapshot.zone_name(zone.zone_number).unwrap_or("?");
                let temp = zone
                    .temperature
                    .map(|t| format!("{t:.1}\u{00b0}C"))
                    .unwrap_or_else(|| "no sensor".to_string());
                println!(
                    "[Zone {} {name}] {} | {}% | setpoint {} | {temp}",
                    zone.zone_number, zone.power, zone.open_percentage, zone.setpoint,
                );
            }
        }
        other => println!("{other:?}"),
    });
    if let Some(path) = flag(&args, "--log") {
        builder = builder.message_log(MessageLogMode::Diffed, path);
    }

    let service = Arc::new(builder.build()?);
    println!("Connecting to {}:{}...", config.host, config.port);
    let poller = Poller::spawn(service.clone(), config.refresh_interval(), Duration::from_secs(10));

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("failed to wait for ctrl-c: {e}");
    }
    poller.stop();
    service.shutdown().await;
    Ok(())
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
