use tracing::info;

use crate::cli::open_output;
use crate::client::{CallingConvention, ChainInterface, RemoteBackend};
use crate::error::Result;
use crate::snapshot::write_snapshot;

pub fn handle_snapshot_command(server: &str, outfile: &str) -> Result<()> {
    let backend = RemoteBackend::new(vec![server.to_string()], CallingConvention::Named);
    let mut steemd = ChainInterface::new(backend);

    info!("Dumping snapshot from {}", server);
    let (accounts, witnesses) = write_snapshot(&mut steemd, open_output(outfile)?)?;
    info!("Snapshot complete: {} accounts, {} witnesses", accounts, witnesses);
    Ok(())
}
