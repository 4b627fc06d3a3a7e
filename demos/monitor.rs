use std::env;

use env_logger;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use philipstv_manager::SupervisorMessage::{EmitAllState, RefreshState, SendTvCommand, ShutDown};
use philipstv_manager::{
    DeviceSettingsBuilder, SupervisorOutputMessage, SyncSupervisorBuilder,
    TvCommand::{SendKey, SetAmbilightPower, SetMute, SetPowerState},
};

#[tokio::main]
async fn main() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(host) = args.first() else {
        return Err(String::from(
            "Usage: cargo run --example monitor -- <tv-host> [<username> <password>]",
        ));
    };

    let mut settings_builder = DeviceSettingsBuilder::new(host);

    if let (Some(username), Some(password)) = (args.get(1), args.get(2)) {
        settings_builder = settings_builder.with_credentials(username, password);
    }

    // Print all logs to stdout
    // LevelFilter::Debug also logs each request and notifier transition
    env_logger::Builder::new()
        .filter(None, log::LevelFilter::Info)
        .init();

    // Initialize supervisor and associated send/receive channels
    let (to_supervisor, to_supervisor_rx) = mpsc::channel(32);
    let (mut supervisor, mut from_supervisor) =
        SyncSupervisorBuilder::new(settings_builder.build(), to_supervisor_rx).build()?;

    let device = supervisor.device_handle();

    // Task to print all messages received from the supervisor
    tokio::spawn(async move {
        while let Some(supervisor_output_msg) = from_supervisor.recv().await {
            println!(
                "<<< Received message from SyncSupervisor: {:?}",
                supervisor_output_msg
            );

            if supervisor_output_msg == SupervisorOutputMessage::ReadyForDependentInit {
                println!(concat!(
                    "\n>>> Enter command:\n",
                    ">>>    on, off (power), u (volume up), d (volume down)\n",
                    ">>>    m (mute), n (unmute), a (ambilight on), z (ambilight off)\n",
                    ">>>    v (query volume), r (refresh), e (emit all state), s (shut down)\n"
                ));
            }
        }
    });

    // Task to accept commands from the console to send to the supervisor
    let stdin_handle = tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);

        loop {
            let mut buf = String::new();

            match reader.read_line(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            let message = match buf.trim() {
                "on" => SendTvCommand(SetPowerState(true)),
                "off" => SendTvCommand(SetPowerState(false)),
                "u" => SendTvCommand(SendKey("VolumeUp".into())),
                "d" => SendTvCommand(SendKey("VolumeDown".into())),
                "m" => SendTvCommand(SetMute(true)),
                "n" => SendTvCommand(SetMute(false)),
                "a" => SendTvCommand(SetAmbilightPower(true)),
                "z" => SendTvCommand(SetAmbilightPower(false)),
                "r" => RefreshState,
                "e" => EmitAllState,
                "v" => {
                    // Query directly rather than through the supervisor
                    println!(">>> Volume: {:?}", device.volume().await);
                    continue;
                }
                "s" => {
                    let _ = to_supervisor.send(ShutDown).await;
                    break;
                }
                _ => continue,
            };

            if to_supervisor.send(message).await.is_err() {
                break;
            }
        }
    });

    // Run the supervisor until instructed to shut down (SupervisorMessage::ShutDown)
    println!("Monitoring Philips TV at {host} (initial poll in a few seconds)...");
    supervisor.run().await;

    stdin_handle.await.map_err(|e| e.to_string())
}
