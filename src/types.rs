//! Shared value types used across the workflow core
use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    #[n(0)]
    Low,
    #[n(1)]
    Medium,
    #[n(2)]
    High,
    #[n(3)]
    Critical,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    #[n(0)]
    Low,
    #[n(1)]
    Normal,
    #[n(2)]
    High,
    #[n(3)]
    Urgent,
}

/// Per-area authorization tier. Ordering matters: guards compare with `>=`.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApprovalLevel {
    #[n(0)]
    None,
    #[n(1)]
    L1,
    #[n(2)]
    L2,
    #[n(3)]
    L3,
}

impl std::fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApprovalLevel::None => "none",
            ApprovalLevel::L1 => "L1",
            ApprovalLevel::L2 => "L2",
            ApprovalLevel::L3 => "L3",
        };
        write!(f, "{s}")
    }
}

impl ApprovalLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            ApprovalLevel::None => 0,
            ApprovalLevel::L1 => 1,
            ApprovalLevel::L2 => 2,
            ApprovalLevel::L3 => 3,
        }
    }
}

/// How the requesting actor relates to a ticket, derived for viewing
/// purposes so the UI never offers an action the engine would reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRelationship {
    Creator,
    Approver,
    Viewer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn approval_levels_are_ordered() {
        assert!(ApprovalLevel::None < ApprovalLevel::L1);
        assert!(ApprovalLevel::L2 >= ApprovalLevel::L2);
        assert!(ApprovalLevel::L3 > ApprovalLevel::L2);
    }
}
