use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Debug log categories: comma-separated names (input,usb,bt,state,
    /// output,profile,lightbar), a preset (all/none/quick), or a hex mask
    #[arg(long, value_name = "SPEC")]
    pub debug: Option<String>,
}
