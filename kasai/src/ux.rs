//! Startup splash for the binary.

const RED: &str = "\x1b[38;5;1m";
const ORANGE: &str = "\x1b[38;5;208m";
const YELLOW: &str = "\x1b[38;5;3m";
const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const RESET: &str = "\x1b[0m";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn banner() -> String {
    [
        format!("{RED}    )"),
        format!("{RED} ( /(     )         )  ("),
        format!("{RED} )\\()) ( /(  (   ( /(  )\\"),
        format!("{ORANGE}((_)\\  )(_)) )\\  )(_))((_)"),
        format!("{ORANGE}| |(_)((_)_ ((_)((_)_  (_)"),
        format!("{YELLOW}| / / / _` |(_-</ _` | | |{RESET}"),
        format!("{YELLOW}|_\\_\\ \\__,_|/__/\\__,_| |_|{RESET}"),
    ]
    .join("\n")
}

pub fn splash_text() -> String {
    format!(
        "{banner}\n\
         {ITALIC}{DESCRIPTION}{RESET}\n\n\
         You're using version {BOLD}{VERSION}{RESET}.\n\n\
         {BOLD}{RED}Information:{RESET}\n \
         • Operating system: {os} ({arch})\n\n\
         {BOLD}{YELLOW}Thanks for using kasai!{RESET}",
        banner = banner(),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
    )
}

pub fn display_splash() {
    println!("{}", splash_text());
}
