use crate::cli::args::{Args, Command, ConfigCommand, ConnectArgs, OutputFormat, SendArgs, TargetArgs};
use crate::cli::output::{ConsoleWriter, OutputWriter, TranscriptLine};
use crate::core::link::{ChannelListener, LinkEvent, LinkOptions, SerialLink};
use crate::domain::config::{SppComConfig, TransportConfig};
use crate::domain::device::{is_bluetooth_address, RemoteDevice};
use crate::domain::error::{SppComError, SppComResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::{bonded_devices, logging, provider_for, rfcomm, scan_devices};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

const DEFAULT_BAUD_RATE: u32 = 115_200;

/// What a line typed into the console asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Empty,
    Send(String),
    Connect,
    Disconnect,
    Commands,
    Help,
    Quit,
    Unknown(String),
}

/// Interpret a console line. `:name` runs a console command or a quick
/// command, `::text` sends `:text` literally, anything else is sent as typed.
pub fn parse_input(line: &str, config: &SppComConfig) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }

    let Some(name) = line.strip_prefix(':') else {
        return ConsoleInput::Send(line.to_string());
    };
    if name.starts_with(':') {
        return ConsoleInput::Send(name.to_string());
    }

    match name {
        "q" | "quit" | "exit" => ConsoleInput::Quit,
        "connect" => ConsoleInput::Connect,
        "disconnect" => ConsoleInput::Disconnect,
        "commands" => ConsoleInput::Commands,
        "help" | "?" => ConsoleInput::Help,
        _ => match config.find_command(name) {
            Some(command) => ConsoleInput::Send(command.payload.clone()),
            None => ConsoleInput::Unknown(name.to_string()),
        },
    }
}

/// Resolve command line target options into a device and its transport.
/// `baud` overrides RFCOMM devices, `channel` Bluetooth ones.
pub fn resolve_target(
    target: &TargetArgs,
    baud: Option<u32>,
    channel: Option<u8>,
    config: &SppComConfig,
) -> SppComResult<(RemoteDevice, TransportConfig)> {
    if let Some(name) = &target.device {
        let device = config
            .find_device(name)
            .ok_or_else(|| SppComError::DeviceNotFound(name.clone()))?;
        let transport = match (&device.transport, baud, channel) {
            (TransportConfig::Rfcomm { .. }, Some(baud_rate), _) => TransportConfig::Rfcomm { baud_rate },
            (TransportConfig::Bluetooth { .. }, _, Some(channel)) => TransportConfig::Bluetooth {
                channel: Some(channel),
            },
            (transport, _, _) => transport.clone(),
        };
        return Ok((device.remote_device(), transport));
    }

    if let Some(address) = &target.bt {
        if !is_bluetooth_address(address) {
            return Err(SppComError::InvalidInput(format!(
                "'{}' is not a Bluetooth address (expected XX:XX:XX:XX:XX:XX)",
                address
            )));
        }
        return Ok((
            RemoteDevice::new(address.to_uppercase(), None),
            TransportConfig::Bluetooth { channel },
        ));
    }

    if let Some(address) = &target.tcp {
        return Ok((RemoteDevice::new(address.clone(), None), TransportConfig::Tcp));
    }

    if let Some(path) = &target.rfcomm {
        return Ok((
            RemoteDevice::new(path.clone(), None),
            TransportConfig::Rfcomm {
                baud_rate: baud.unwrap_or(DEFAULT_BAUD_RATE),
            },
        ));
    }

    Err(SppComError::InvalidInput(
        "one of --device, --tcp, --rfcomm or --bt is required".to_string(),
    ))
}

/// Execute CLI command
pub async fn execute_command(args: Args) -> SppComResult<()> {
    let writer = ConsoleWriter::new(args.output);

    // Load configuration using ConfigManager
    let config_manager = ConfigManager::new()?;
    let config = if let Some(config_path) = &args.config {
        config_manager.load_config_from_path(config_path.as_ref())?
    } else {
        config_manager.load_config()?
    };

    // Initialize logging
    if !args.quiet {
        let level = if args.verbose { "debug" } else { config.global.log_level.as_str() };
        if let Err(e) = logging::init_logging(level) {
            writer.write_error(&format!("Failed to initialize logging: {}", e))?;
        }
    }

    match args.command {
        Command::Devices => Ok(writer.write_devices(&config.devices)?),
        Command::Commands => Ok(writer.write_commands(&config.commands)?),
        Command::Ports => {
            let ports = rfcomm::available_ports()?;
            Ok(writer.write_ports(&ports)?)
        }
        Command::Scan { seconds } => {
            if !args.quiet && args.output == OutputFormat::Text {
                writer.write_message(&format!("Scanning for {} seconds...", seconds))?;
            }
            let devices = scan_devices(Duration::from_secs(seconds)).await?;
            Ok(writer.write_bluetooth_devices(&devices)?)
        }
        Command::Paired => {
            let devices = bonded_devices().await?;
            Ok(writer.write_bluetooth_devices(&devices)?)
        }
        Command::Connect(connect_args) => run_console(connect_args, &config, &writer).await,
        Command::Send(send_args) => run_send(send_args, &config, &writer).await,
        Command::Config(config_args) => match config_args.command {
            ConfigCommand::Init { path } => {
                let file = config_manager.init_project_config(Path::new(&path))?;
                Ok(writer.write_message(&format!("Created {}", file.display()))?)
            }
            ConfigCommand::Show => Ok(writer.write_config(&config)?),
            ConfigCommand::Path => {
                writer.write_message(&format!(
                    "global:  {}",
                    config_manager.get_global_config_path_ref().display()
                ))?;
                let project = config_manager
                    .get_project_config_path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string());
                Ok(writer.write_message(&format!("project: {}", project))?)
            }
        },
        Command::Version => Ok(writer.write_message(&format!("sppcom {}", env!("CARGO_PKG_VERSION")))?),
    }
}

fn open_link(
    config: &SppComConfig,
    transport: &TransportConfig,
) -> SppComResult<(Arc<SerialLink>, UnboundedReceiver<LinkEvent>)> {
    let provider = provider_for(transport)?;
    let (listener, events) = ChannelListener::channel();
    let options = LinkOptions {
        service: config.global.service_uuid,
        read_buffer_size: config.global.read_buffer_size,
    };
    let link = SerialLink::with_options(provider, Arc::new(listener), options);
    Ok((Arc::new(link), events))
}

/// `send` blocks until the bytes are written, so keep it off the runtime threads
async fn send_line(link: &Arc<SerialLink>, text: String) -> SppComResult<()> {
    let link = Arc::clone(link);
    tokio::task::spawn_blocking(move || link.send(&text))
        .await
        .map_err(|e| SppComError::Io(io::Error::new(io::ErrorKind::Other, e)))
}

async fn run_console(args: ConnectArgs, config: &SppComConfig, writer: &ConsoleWriter) -> SppComResult<()> {
    let (device, transport) = resolve_target(&args.target, args.baud, args.channel, config)?;
    let (link, mut events) = open_link(config, &transport)?;

    writer.write_transcript(&TranscriptLine::status(format!(
        "Connecting to {} over {}... (:help for commands)",
        device, transport
    )))?;
    link.connect(&device);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => writer.write_transcript(&TranscriptLine::from_event(&event, args.hex))?,
                None => break,
            },
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line, config) {
                    ConsoleInput::Empty => {}
                    ConsoleInput::Quit => break,
                    ConsoleInput::Connect => {
                        writer.write_transcript(&TranscriptLine::status(format!("Connecting to {}...", device)))?;
                        link.connect(&device);
                    }
                    ConsoleInput::Disconnect => link.disconnect(),
                    ConsoleInput::Commands => writer.write_commands(&config.commands)?,
                    ConsoleInput::Help => writer.write_message(
                        ":connect  :disconnect  :commands  :quit  :<quick command>  ::text sends \":text\"",
                    )?,
                    ConsoleInput::Unknown(name) => {
                        writer.write_transcript(&TranscriptLine::status(format!("Unknown command :{}", name)))?;
                    }
                    ConsoleInput::Send(text) => {
                        if link.is_connected() {
                            send_line(&link, text.clone()).await?;
                            writer.write_transcript(&TranscriptLine::outgoing(text))?;
                        } else {
                            writer.write_transcript(&TranscriptLine::status("Not connected. Use :connect first."))?;
                        }
                    }
                }
            }
        }
    }

    link.disconnect();
    drain_events(&mut events, writer, args.hex)?;
    Ok(())
}

async fn run_send(args: SendArgs, config: &SppComConfig, writer: &ConsoleWriter) -> SppComResult<()> {
    let (device, transport) = resolve_target(&args.target, args.baud, args.channel, config)?;
    let (link, mut events) = open_link(config, &transport)?;

    let mut lines = Vec::with_capacity(args.commands.len());
    for command in &args.commands {
        match parse_input(command, config) {
            ConsoleInput::Send(text) => lines.push(text),
            ConsoleInput::Empty => {}
            other => {
                return Err(SppComError::InvalidInput(format!(
                    "'{}' is not something that can be sent ({:?})",
                    command, other
                )))
            }
        }
    }

    link.connect(&device);

    // Wait for the outcome of the handshake
    loop {
        match events.recv().await {
            Some(event @ LinkEvent::Connected { .. }) => {
                writer.write_transcript(&TranscriptLine::from_event(&event, args.hex))?;
                break;
            }
            Some(LinkEvent::Error(message)) => {
                return Err(SppComError::Session { message });
            }
            Some(event) => writer.write_transcript(&TranscriptLine::from_event(&event, args.hex))?,
            None => {
                return Err(SppComError::Session {
                    message: "link closed before connecting".to_string(),
                })
            }
        }
    }

    for text in lines {
        send_line(&link, text.clone()).await?;
        writer.write_transcript(&TranscriptLine::outgoing(text))?;
        drain_events(&mut events, writer, args.hex)?;
    }

    let wait = Duration::from_millis(args.wait_ms);
    while let Ok(Some(event)) = tokio::time::timeout(wait, events.recv()).await {
        let disconnected = event == LinkEvent::Disconnected;
        writer.write_transcript(&TranscriptLine::from_event(&event, args.hex))?;
        if disconnected {
            return Ok(());
        }
    }

    link.disconnect();
    drain_events(&mut events, writer, args.hex)?;
    Ok(())
}

/// Print whatever events are already queued
fn drain_events(
    events: &mut UnboundedReceiver<LinkEvent>,
    writer: &ConsoleWriter,
    hex: bool,
) -> SppComResult<()> {
    while let Ok(event) = events.try_recv() {
        debug!("Draining {:?}", event);
        writer.write_transcript(&TranscriptLine::from_event(&event, hex))?;
    }
    Ok(())
}
