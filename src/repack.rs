//! Live porting: replays a source chain's operations on the testnet.

use tracing::{info, warn};

use crate::action::Action;
use crate::batch::batch_transactions;
use crate::chain_reader::ChainReader;
use crate::client::{CallingConvention, ChainInterface, RemoteBackend};
use crate::config::PortConfig;
use crate::error::{MirrornetError, Result};
use crate::keys::procedural::ProceduralKeyDatabase;
use crate::operation::Transaction;

/// Grace period after a bounded port so the last batch gets produced.
pub const BOUNDED_PORT_WAIT_BLOCKS: u64 = 50;

pub fn source_interface(conf: &PortConfig) -> Result<ChainInterface> {
    let source = &conf.transaction_source;
    let backend = RemoteBackend::from_config(
        &conf.rpc,
        vec![source.node.clone()],
        CallingConvention::from_appbase(source.appbase),
    )?;
    Ok(ChainInterface::new(backend))
}

/// Range reader when `max_block_number` is set, head-following reader otherwise.
pub fn open_reader<'a>(conf: &PortConfig, steemd: &'a mut ChainInterface) -> ChainReader<'a> {
    if conf.ported_operations.is_empty() {
        warn!("No ported_operations configured, nothing will be ported");
    }
    if conf.max_block_number > 0 {
        info!("Porting blocks [{}, {})", conf.min_block_number, conf.max_block_number);
        ChainReader::range(steemd, &conf.ported_operations, conf.min_block_number, conf.max_block_number)
    } else {
        info!("Following source chain from block {}", conf.min_block_number);
        ChainReader::tail(steemd, &conf.ported_operations, conf.min_block_number)
    }
}

/// One single-operation transaction per source operation.
pub fn repack_operations<'a>(conf: &PortConfig, reader: ChainReader<'a>) -> impl Iterator<Item = Result<Transaction>> + 'a {
    let signer = ProceduralKeyDatabase::new().active_privkey(&conf.transaction_signer);
    reader.map(move |op| -> Result<Transaction> { Ok(Transaction::new(vec![op?.into_operation()], signer.clone())) })
}

pub fn build_actions<'a>(conf: &PortConfig, reader: ChainReader<'a>) -> Result<impl Iterator<Item = Result<Action>> + 'a> {
    if conf.transactions_per_block == 0 {
        return Err(MirrornetError::Config("transactions_per_block must be positive".to_string()));
    }
    let closing = (conf.max_block_number > 0).then(|| Ok(Action::wait(BOUNDED_PORT_WAIT_BLOCKS)));
    Ok(batch_transactions(repack_operations(conf, reader), conf.transactions_per_block).chain(closing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_reader::StopHandle;
    use crate::client::rpc_client::tests::ScriptedTransport;
    use serde_json::{json, Value};

    fn port_config(max_block_number: u64, per_block: usize) -> PortConfig {
        serde_json::from_value(json!({
            "transaction_source": {"node": "http://source", "appbase": false},
            "min_block_number": 1,
            "max_block_number": max_block_number,
            "ported_operations": ["transfer_operation"],
            "transaction_signer": "tnman",
            "transactions_per_block": per_block,
        }))
        .unwrap()
    }

    fn interface(transport: &ScriptedTransport, conf: &PortConfig) -> ChainInterface {
        let backend = RemoteBackend::new(vec![conf.transaction_source.node.clone()], CallingConvention::Positional)
            .with_transport(transport.clone())
            .with_sleep(|_| {});
        ChainInterface::new(backend)
    }

    fn legacy_block(to: &str) -> Value {
        json!({ "transactions": [ { "operations": [
            ["vote", {"voter": "alice"}],
            ["transfer", {"from": "alice", "to": to, "amount": "1.000 STEEM", "memo": ""}],
        ] } ] })
    }

    #[test]
    fn test_bounded_port() {
        let conf = port_config(3, 1);
        let transport = ScriptedTransport::default();
        transport.push_result(legacy_block("bob"));
        transport.push_result(legacy_block("carol"));

        let mut steemd = interface(&transport, &conf);
        let reader = open_reader(&conf, &mut steemd);
        let lines: Vec<String> = build_actions(&conf, reader)
            .unwrap()
            .map(|a| a.unwrap().to_line().unwrap())
            .collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], r#"["wait_blocks",{"count":1}]"#);
        assert_eq!(
            lines[1],
            r#"["submit_transaction",{"esc":"Z","tx":{"operations":[["transfer",{"amount":"1.000 STEEM","from":"alice","memo":"","to":"bob"}]],"wif_sigs":["Zprivatekey:active-tnmanZ"]}}]"#
        );
        assert_eq!(lines[4], r#"["wait_blocks",{"count":50}]"#);
    }

    #[test]
    fn test_tail_port_has_no_closing_wait() {
        let conf = port_config(0, 40);
        let transport = ScriptedTransport::default();
        transport.push_result(json!({ "head_block_number": 2 }));
        transport.push_result(legacy_block("bob"));
        transport.push_result(json!({ "head_block_number": 2 }));

        let stop = StopHandle::default();
        let stop_on_idle = stop.clone();
        let mut steemd = interface(&transport, &conf);
        let reader = open_reader(&conf, &mut steemd)
            .with_stop_handle(stop)
            .with_sleep(move |_| stop_on_idle.stop());

        let actions: Vec<Action> = build_actions(&conf, reader).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], Action::wait(1));
        assert_eq!(actions[1].kind(), "submit_transaction");
    }

    #[test]
    fn test_source_errors_surface() {
        let conf = port_config(2, 10);
        let transport = ScriptedTransport::default();
        transport.push_result(Value::Null);

        let mut steemd = interface(&transport, &conf);
        let reader = open_reader(&conf, &mut steemd);
        let results: Vec<Result<Action>> = build_actions(&conf, reader).unwrap().collect();
        assert!(matches!(results[0], Err(MirrornetError::Decode(_))));
    }

    #[test]
    fn test_source_interface_convention() {
        let conf = port_config(2, 10);
        assert_eq!(source_interface(&conf).unwrap().convention(), CallingConvention::Positional);
    }
}
