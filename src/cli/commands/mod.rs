use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("pordisto")
        .about("External authentication gate")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("PORDISTO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("authority")
                .short('a')
                .long("authority")
                .help("Domain of the authentication authority, example: auth.example.com")
                .env("PORDISTO_AUTHORITY")
                .required(true),
        )
        .arg(
            Arg::new("redirector-path")
                .long("redirector-path")
                .help("Authority path that sends visitors to the sign-in page, example: /redirector")
                .env("PORDISTO_REDIRECTOR_PATH")
                .required(true),
        )
        .arg(
            Arg::new("session-path")
                .long("session-path")
                .help("Authority path that exchanges one-time tokens for session data, example: /session-info")
                .env("PORDISTO_SESSION_PATH")
                .required(true),
        )
        .arg(
            Arg::new("secret")
                .short('s')
                .long("secret")
                .help("Shared secret used to verify one-time token signatures")
                .env("PORDISTO_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("issuer")
                .long("issuer")
                .help("Issuer expected in one-time tokens")
                .env("PORDISTO_ISSUER")
                .required(true),
        )
        .arg(
            Arg::new("cookie-prefix")
                .long("cookie-prefix")
                .help("Prefix for the gate's cookies")
                .default_value("_pordisto_")
                .env("PORDISTO_COOKIE_PREFIX"),
        )
        .arg(
            Arg::new("session-expire")
                .long("session-expire")
                .help("Session lifetime in seconds, 0 keeps the cookie until the browser closes")
                .default_value("0")
                .env("PORDISTO_SESSION_EXPIRE")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("use-tls")
                .long("use-tls")
                .help("Use https towards the authority and mark cookies Secure")
                .env("PORDISTO_USE_TLS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("allow-external-return")
                .long("allow-external-return")
                .help("Allow return URLs pointing at other sites")
                .env("PORDISTO_ALLOW_EXTERNAL_RETURN")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("PORDISTO_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
