use crate::args::common::{MqttBenchArgs, TransportArg};
use crate::error::BenchError;
use crate::transport::loopback::{LoopbackBroker, LoopbackTransportFactory};
use crate::transport::mqtt::{MqttSettings, MqttTransportFactory};
use crate::transport::TransportFactory;
use std::sync::Arc;

pub fn create_transport_factory(
    args: &MqttBenchArgs,
) -> Result<Arc<dyn TransportFactory>, BenchError> {
    match args.transport {
        TransportArg::Mqtt => {
            let settings = MqttSettings {
                keep_alive: args.keep_alive,
                connect_timeout: args.connect_timeout,
                max_inflight: args.max_inflight(),
                automatic_reconnect: args.automatic_reconnect,
            };
            Ok(Arc::new(MqttTransportFactory::new(
                args.server_address(),
                settings,
            )?))
        }
        TransportArg::Loopback => Ok(Arc::new(LoopbackTransportFactory::new(
            LoopbackBroker::new(),
        ))),
    }
}
