use crate::cli::{open_input, open_output};
use crate::error::Result;
use crate::keys::{DevKeyOracle, KeyResolver, KeySubstituter};

pub fn handle_keysub_command(input_file: &str, output_file: &str, get_dev_key: &str) -> Result<()> {
    let resolver = KeyResolver::new(DevKeyOracle::new(get_dev_key));
    KeySubstituter::new(resolver).run(open_input(input_file)?, open_output(output_file)?)?;
    Ok(())
}
