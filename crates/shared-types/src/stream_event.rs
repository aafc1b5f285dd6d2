//! # Stream Event Contract
//!
//! Every payload that flows through a bus and out to a client implements
//! [`StreamEvent`]. The streaming layer only needs the discriminator and the
//! timestamp; everything else is opaque and serialized as-is.

use chrono::{DateTime, Utc};

/// Contract between producers and the streaming layer.
pub trait StreamEvent: Clone + Send + Sync + 'static {
    /// Every discriminator this payload can carry.
    ///
    /// This is the default server-side allowed set for a bus of this payload.
    const TYPES: &'static [&'static str];

    /// Stable string discriminator, serialized as the `type` field.
    fn event_type(&self) -> &'static str;

    /// Producer-assigned timestamp. `None` means unset.
    fn timestamp(&self) -> Option<DateTime<Utc>>;

    /// Overwrite the timestamp.
    fn set_timestamp(&mut self, at: DateTime<Utc>);

    /// Stamp the event with `now` if the producer left the timestamp unset.
    fn stamp_if_unset(&mut self, now: DateTime<Utc>) {
        if self.timestamp().is_none() {
            self.set_timestamp(now);
        }
    }
}

/// Declares an event kind enum with its wire names.
///
/// Generates `as_str`, `ALL`, `Display` and `FromStr` so that the wire name is
/// written exactly once.
macro_rules! event_kinds {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant ),+
        }

        impl $name {
            /// Wire names of every variant.
            pub const ALL: &'static [&'static str] = &[ $( $wire ),+ ];

            /// Wire name of this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $wire ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::errors::UnknownEventType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok(Self::$variant), )+
                    other => Err($crate::errors::UnknownEventType(other.to_string())),
                }
            }
        }
    };
}

/// Implements [`StreamEvent`] for a payload with `kind` and `timestamp` fields.
macro_rules! impl_stream_event {
    ($event:ty, $kind:ty) => {
        impl $crate::stream_event::StreamEvent for $event {
            const TYPES: &'static [&'static str] = <$kind>::ALL;

            fn event_type(&self) -> &'static str {
                self.kind.as_str()
            }

            fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
                self.timestamp
            }

            fn set_timestamp(&mut self, at: chrono::DateTime<chrono::Utc>) {
                self.timestamp = Some(at);
            }
        }
    };
}

pub(crate) use event_kinds;
pub(crate) use impl_stream_event;
