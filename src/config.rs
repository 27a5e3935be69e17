use std::net::{Ipv4Addr, SocketAddr};
use std::process::exit;

use clap::{CommandFactory, Parser};

/// SRT transport proxy with link aggregation.
///
/// Accepts SRTLA connections from multiplexing senders and relays the
/// aggregated stream to an upstream SRT server.
#[derive(Parser, Debug)]
#[command(name = "srtla_rec", disable_help_flag = true, disable_version_flag = true)]
#[command(override_usage = "srtla_rec [-v] SRTLA_LISTEN_PORT SRT_HOST SRT_PORT")]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'v')]
    version: bool,

    /// UDP port to listen on for SRTLA senders
    listen_port: Option<String>,

    /// Hostname of the upstream SRT server
    srt_host: Option<String>,

    /// Port of the upstream SRT server
    srt_port: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub srt_host: String,
    pub srt_port: u16,
}

impl Config {
    /// Parses the command line.
    ///
    /// The legacy contract is kept as is: `-v` prints the version and
    /// exits 0, and missing or invalid arguments print the usage text and
    /// also exit 0.
    pub fn load() -> Self {
        let cli = match Cli::try_parse() {
            Ok(cli) => cli,
            Err(_) => usage(),
        };

        if cli.version {
            println!("{}", crate::SOFTWARE);
            exit(0);
        }

        let (Some(listen_port), Some(srt_host), Some(srt_port)) =
            (cli.listen_port, cli.srt_host, cli.srt_port)
        else {
            usage()
        };

        let (Some(listen_port), Some(srt_port)) = (parse_port(&listen_port), parse_port(&srt_port))
        else {
            usage()
        };

        Self {
            listen_port,
            srt_host,
            srt_port,
        }
    }

    /// The wildcard IPv4 address the SRTLA socket binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.listen_port))
    }
}

fn parse_port(value: &str) -> Option<u16> {
    value.parse::<u16>().ok().filter(|port| *port != 0)
}

fn usage() -> ! {
    let _ = Cli::command().print_help();
    exit(0);
}

#[cfg(test)]
mod tests {
    use super::parse_port;

    #[test]
    fn port_parsing() {
        assert_eq!(parse_port("8282"), Some(8282));
        assert_eq!(parse_port("65535"), Some(65535));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("65536"), None);
        assert_eq!(parse_port("srt"), None);
        assert_eq!(parse_port("-1"), None);
    }
}
