//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Mapping of inbound wire records onto writable channels."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use r_ems_channel::{Channel, ChannelRecord};
use tracing::trace;

use crate::record::WireProperties;

/// Build write requests for every writable channel named in `properties`.
///
/// The value tag must equal the channel's declared type exactly; missing
/// keys, type mismatches and disabled or read-only channels are skipped.
pub fn match_writes<'a, I>(properties: &WireProperties, channels: I) -> Vec<ChannelRecord>
where
    I: IntoIterator<Item = &'a Channel>,
{
    let mut writes = Vec::new();
    for channel in channels {
        if !channel.is_writable() {
            continue;
        }
        let Some(value) = properties.get(&channel.name) else {
            continue;
        };
        if value.data_type() != channel.value_type {
            trace!(
                channel = %channel.name,
                expected = %channel.value_type,
                actual = %value.data_type(),
                "ignoring write with mismatched type"
            );
            continue;
        }
        writes.push(ChannelRecord::write_request(&channel.name, value.clone()));
    }
    writes
}

#[cfg(test)]
mod tests {
    use r_ems_channel::{ChannelType, DataType, TypedValue};

    use super::*;

    fn speed() -> Channel {
        Channel::new("speed", ChannelType::Write, DataType::Integer)
    }

    fn props(entries: &[(&str, TypedValue)]) -> WireProperties {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn exact_type_produces_write() {
        let channels = [speed()];
        let writes = match_writes(&props(&[("speed", TypedValue::Integer(5))]), &channels);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].channel_name(), "speed");
        assert_eq!(writes[0].value(), Some(&TypedValue::Integer(5)));
    }

    #[test]
    fn mismatched_type_is_skipped() {
        let channels = [speed()];
        assert!(match_writes(&props(&[("speed", TypedValue::from("5"))]), &channels).is_empty());
        assert!(match_writes(&props(&[("speed", TypedValue::Long(5))]), &channels).is_empty());
    }

    #[test]
    fn missing_key_is_skipped() {
        let channels = [speed()];
        assert!(match_writes(&props(&[("rpm", TypedValue::Integer(5))]), &channels).is_empty());
    }

    #[test]
    fn read_only_and_disabled_channels_are_skipped() {
        let channels = [
            Channel::new("temp", ChannelType::Read, DataType::Double),
            Channel::new("valve", ChannelType::ReadWrite, DataType::Boolean).with_enabled(false),
            Channel::new("mode", ChannelType::ReadWrite, DataType::String),
        ];
        let writes = match_writes(
            &props(&[
                ("temp", TypedValue::Double(1.0)),
                ("valve", TypedValue::Boolean(true)),
                ("mode", TypedValue::from("auto")),
            ]),
            &channels,
        );
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].channel_name(), "mode");
    }
}
