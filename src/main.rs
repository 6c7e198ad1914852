use anyhow::Result;

mod app;
mod logging;

fn main() -> Result<()> {
    let args = treesync::cli::parse();
    app::run(args)
}
