use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "arcfs")]
#[command(version)]
#[command(about = "Browse ISO 9660 and ZIP archives as read-only file systems", long_about = None)]
#[command(after_help = "Examples:\n  \
  arcfs image.iso                      list the image root\n  \
  arcfs -l archive.zip /docs           list a directory inside the archive\n  \
  arcfs -p archive.zip /docs/a.txt     print a file to stdout\n  \
  arcfs -l https://example.com/big.zip list a remote archive via Range requests")]
pub struct Cli {
    /// Archive path (ISO 9660 or ZIP) or HTTP URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Paths inside the archive (default: /)
    #[arg(value_name = "PATHS")]
    pub paths: Vec<String>,

    /// List directory contents
    #[arg(short = 'l')]
    pub list: bool,

    /// Long listing (mode, size, mtime)
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Print file contents to stdout
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Decompress ZIP entries on first read instead of at mount
    #[arg(long)]
    pub lazy: bool,

    /// Fold ISO path lookups to upper case
    #[arg(long)]
    pub upper: bool,

    /// Quiet mode
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.archive.starts_with("http://") || self.archive.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }
}
