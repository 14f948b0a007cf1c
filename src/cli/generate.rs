use tracing::info;

use crate::action::ActionWriter;
use crate::cli::open_output;
use crate::config::{PortConfig, TxgenConfig};
use crate::error::Result;
use crate::repack;
use crate::snapshot::Snapshot;
use crate::txgen::SetupGenerator;

pub fn handle_txgen_command(conffile: &str, outfile: &str) -> Result<()> {
    let conf = TxgenConfig::load(conffile)?;
    let snapshot = Snapshot::load(&conf.snapshot_file)?;
    let generator = SetupGenerator::new(&conf, &snapshot)?;

    let mut writer = ActionWriter::new(open_output(outfile)?);
    writer.write_all(generator.actions()?)?;
    writer.finish()?;
    info!("Setup actions written to {}", outfile);
    Ok(())
}

pub fn handle_port_command(conffile: &str, outfile: &str) -> Result<()> {
    let conf = PortConfig::load(conffile)?;
    let mut steemd = repack::source_interface(&conf)?;
    let reader = repack::open_reader(&conf, &mut steemd);

    let mut writer = ActionWriter::new(open_output(outfile)?);
    writer.write_all(repack::build_actions(&conf, reader)?)?;
    writer.finish()?;
    Ok(())
}
