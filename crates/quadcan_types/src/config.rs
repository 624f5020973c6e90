//! QuadCan config tuning params.
#![allow(missing_docs)]

/// Wrapper for the actual CanTuningParams struct
/// so the widely used type def can be an Arc<>
pub mod tuning_params_struct {
    use std::collections::HashMap;

    macro_rules! mk_tune {
        ($($(#[doc = $doc:expr])* $i:ident: $t:ty = $d:expr,)*) => {
            /// Overlay tuning parameters.
            /// This is serialized carefully so all the values can be represented
            /// as strings in YAML - and we will be able to proceed with a printed
            /// warning for tuning params that are removed, but still specified in
            /// configs.
            #[non_exhaustive]
            #[derive(Clone, Debug, PartialEq)]
            pub struct CanTuningParams {
                $(
                    $(#[doc = $doc])*
                    pub $i: $t,
                )*
            }

            impl Default for CanTuningParams {
                fn default() -> Self {
                    Self {
                        $(
                            $i: $d,
                        )*
                    }
                }
            }

            impl serde::Serialize for CanTuningParams {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    use serde::ser::SerializeMap;
                    let mut m = serializer.serialize_map(None)?;
                    $(
                        m.serialize_entry(
                            stringify!($i),
                            &format!("{}", &self.$i),
                        )?;
                    )*
                    m.end()
                }
            }

            impl<'de> serde::Deserialize<'de> for CanTuningParams {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    let result = <HashMap<String, String>>::deserialize(deserializer)?;
                    let mut out = CanTuningParams::default();
                    for (k, v) in result.into_iter() {
                        match k.as_str() {
                            $(
                                stringify!($i) => match v.parse::<$t>() {
                                    Ok(v) => out.$i = v,
                                    Err(e) => tracing::warn!("failed to parse {}: {}", k, e),
                                },
                            )*
                            _ => tracing::warn!("INVALID TUNING PARAM: '{}'", k),
                        }
                    }
                    Ok(out)
                }
            }
        };
    }

    mk_tune! {
        /// Maximum number of neighbors a single multicast/broadcast hop
        /// will fan out to. [Default: 8]
        routing_fan_out_limit: usize = 8,

        /// Maximum number of forward hops a request may take before it
        /// is dropped. An incomplete neighbor view can route a unicast
        /// in a cycle; the budget makes such a request die instead of
        /// circulating until the caller times out. [Default: 64]
        routing_hop_limit: u64 = 64,

        /// Fixed delay between load-balancing evaluation ticks, in
        /// milliseconds. [Default: 60s]
        load_balancing_period_ms: u64 = 60_000,

        /// Fixed delay between gossip pushes of the local load report,
        /// in milliseconds. [Default: 15s]
        gossip_period_ms: u64 = 15_000,

        /// How many peers a single gossip push targets. [Default: 3]
        gossip_fan_out: usize = 3,

        /// Overload factor: a criterion is overloaded when
        /// measurement >= estimate * k1. [Default: 2.0]
        load_balancing_k1: f64 = 2.0,

        /// Underload factor: a criterion is underloaded when
        /// measurement < estimate * k2. [Default: 0.5]
        load_balancing_k2: f64 = 0.5,

        /// Bounded wait for the gossip sub-loop to drain on shutdown,
        /// in milliseconds. [Default: 5s]
        shutdown_wait_ms: u64 = 5_000,

        /// Default caller-side timeout for overlay requests, in
        /// milliseconds. [Default: 30s]
        default_rpc_timeout_ms: u64 = 30_000,
    }
}

/// We don't want to clone these tuning params around everywhere,
/// the instance should generally be passed as an Arc.
pub type CanTuningParams = std::sync::Arc<tuning_params_struct::CanTuningParams>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = tuning_params_struct::CanTuningParams::default();
        assert_eq!(8, p.routing_fan_out_limit);
        assert_eq!(1.0, p.load_balancing_k1 / 2.0);
    }

    #[test]
    fn string_map_round_trip_with_unknown_keys() {
        let json = r#"{
            "routing_fan_out_limit": "4",
            "load_balancing_k2": "0.25",
            "some_removed_param": "true"
        }"#;
        let p: tuning_params_struct::CanTuningParams = serde_json::from_str(json).unwrap();
        assert_eq!(4, p.routing_fan_out_limit);
        assert_eq!(0.25, p.load_balancing_k2);
        // untouched params keep their defaults
        assert_eq!(15_000, p.gossip_period_ms);
    }
}
