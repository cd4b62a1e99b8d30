pub const USAGE: &str = "Usage: coddle-chat [--wait] <message...>";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatMode {
    /// Print assistant content as it arrives.
    #[default]
    Stream,
    /// Block until the run settles and print one reply.
    Wait,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Help,
    Chat { mode: ChatMode, message: String },
}

/// Parses the arguments after the program name.
pub fn parse_args<I, S>(args: I) -> Result<CliCommand, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut mode = ChatMode::default();
    let mut words = Vec::new();
    let mut flags_done = false;

    for arg in args {
        let arg = arg.as_ref();
        if flags_done || !arg.starts_with('-') || arg == "-" {
            words.push(arg.to_string());
            continue;
        }
        match arg {
            "--" => flags_done = true,
            "-h" | "--help" => return Ok(CliCommand::Help),
            "-w" | "--wait" => mode = ChatMode::Wait,
            "--stream" => mode = ChatMode::Stream,
            unknown => return Err(format!("Unknown option '{unknown}'")),
        }
    }

    let message = words.join(" ");
    if message.trim().is_empty() {
        return Err("A message is required".to_string());
    }
    Ok(CliCommand::Chat { mode, message })
}
