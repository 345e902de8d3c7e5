use tracing::trace;

use super::field::{FieldKind, HidField};
use crate::{
    error::{MappingError, Result},
    host::ReportOut,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// One field whose value differs from the previous report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldChange {
    pub index: usize,
    pub value: i64,
    pub previous: i64,
}

/// Fixed-size report with named fields. Byte 0 always carries the report id.
#[derive(Debug, Clone)]
pub struct HidPacket {
    name: String,
    report_id: u8,
    length: usize,
    direction: Direction,
    fields: Vec<HidField>,
    last_sent: Option<Vec<u8>>,
}

impl HidPacket {
    pub fn new(
        name: impl Into<String>,
        report_id: u8,
        length: usize,
        direction: Direction,
    ) -> Self {
        Self {
            name: name.into(),
            report_id,
            length: length.max(1),
            direction,
            fields: Vec::new(),
            last_sent: None,
        }
    }

    pub fn input(name: impl Into<String>, report_id: u8, length: usize) -> Self {
        Self::new(name, report_id, length, Direction::Input)
    }

    pub fn output(name: impl Into<String>, report_id: u8, length: usize) -> Self {
        Self::new(name, report_id, length, Direction::Output)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn report_id(&self) -> u8 {
        self.report_id
    }

    #[cfg(test)]
    pub fn fields(&self) -> &[HidField] {
        &self.fields
    }

    /// Declare a field. Returns its index.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        offset: usize,
        kind: FieldKind,
        mask: Option<u32>,
    ) -> Result<usize> {
        let field = HidField::new(name, offset, kind, mask)?;
        if offset == 0 {
            return Err(MappingError::ReservedOffset {
                packet: self.name.clone(),
                field: field.name().to_string(),
            });
        }
        let fits = offset
            .checked_add(kind.width())
            .is_some_and(|end| end <= self.length);
        if !fits {
            return Err(MappingError::FieldOutOfBounds {
                packet: self.name.clone(),
                field: field.name().to_string(),
                offset,
                width: kind.width(),
                length: self.length,
            });
        }
        if let Some(other) = self.fields.iter().find(|other| field.conflicts_with(other)) {
            return Err(MappingError::FieldOverlap {
                packet: self.name.clone(),
                field: field.name().to_string(),
                other: other.name().to_string(),
            });
        }
        self.fields.push(field);
        Ok(self.fields.len() - 1)
    }

    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|field| field.name() == name)
            .ok_or_else(|| MappingError::UnknownField {
                packet: self.name.clone(),
                field: name.to_string(),
            })
    }

    pub fn field(&self, index: usize) -> Option<&HidField> {
        self.fields.get(index)
    }

    #[cfg(test)]
    pub fn value(&self, name: &str) -> Result<i64> {
        let index = self.field_index(name)?;
        Ok(self.fields[index].value())
    }

    /// Decode a raw report, store the new values and report the fields that changed.
    ///
    /// Every field is extracted before any stored value is touched, so the
    /// returned changes all describe the same report.
    pub fn parse(&mut self, raw: &[u8]) -> Result<Vec<FieldChange>> {
        if self.direction != Direction::Input {
            return Err(MappingError::WrongDirection(self.name.clone()));
        }
        if raw.len() < self.length {
            return Err(MappingError::ShortReport {
                packet: self.name.clone(),
                expected: self.length,
                got: raw.len(),
            });
        }
        let snapshot: Vec<i64> = self.fields.iter().map(|field| field.extract(raw)).collect();
        let mut changes = Vec::new();
        for (index, (field, value)) in self.fields.iter_mut().zip(snapshot).enumerate() {
            let previous = field.value();
            if previous != value {
                field.set_value(value);
                changes.push(FieldChange {
                    index,
                    value,
                    previous,
                });
            }
        }
        Ok(changes)
    }

    /// Stage a value for the next `send`.
    pub fn set_field(&mut self, name: &str, value: i64) -> Result<()> {
        if self.direction != Direction::Output {
            return Err(MappingError::WrongDirection(self.name.clone()));
        }
        let index = self.field_index(name)?;
        let field = &mut self.fields[index];
        field.set_value(value.clamp(field.min(), field.max()));
        Ok(())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.length];
        buf[0] = self.report_id;
        for field in &self.fields {
            field.insert(field.value(), &mut buf);
        }
        buf
    }

    /// Transmit the staged report if it differs from the last one sent.
    pub fn send(&mut self, out: &mut dyn ReportOut) -> bool {
        let buf = self.serialize();
        let dirty = self.last_sent.as_deref() != Some(buf.as_slice());
        if dirty {
            trace!(packet = %self.name, bytes = ?buf, "send report");
            out.send_report(&buf);
        }
        self.last_sent = Some(buf);
        dirty
    }

    /// Zero every field and transmit unconditionally.
    pub fn clear(&mut self, out: &mut dyn ReportOut) {
        for field in &mut self.fields {
            field.set_value(0);
        }
        let buf = self.serialize();
        out.send_report(&buf);
        self.last_sent = Some(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingReports;
    use proptest::prelude::*;

    fn buttons() -> HidPacket {
        let mut packet = HidPacket::input("buttons", 0x01, 4);
        packet.add_field("knob", 1, FieldKind::U16, None).unwrap();
        packet.add_field("a", 3, FieldKind::U8, Some(0x01)).unwrap();
        packet.add_field("b", 3, FieldKind::U8, Some(0x10)).unwrap();
        packet
    }

    #[test]
    fn only_changed_fields_are_reported() {
        let mut packet = buttons();
        let changes = packet.parse(&[0x01, 0x00, 0x02, 0x11]).unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0], FieldChange { index: 0, value: 0x200, previous: 0 });

        let changes = packet.parse(&[0x01, 0x00, 0x02, 0x10]).unwrap();
        assert_eq!(changes, vec![FieldChange { index: 1, value: 0, previous: 1 }]);

        assert!(packet.parse(&[0x01, 0x00, 0x02, 0x10]).unwrap().is_empty());
        assert_eq!(packet.value("b").unwrap(), 1);
    }

    #[test]
    fn registration_errors() {
        let mut packet = buttons();
        assert!(matches!(
            packet.add_field("over", 2, FieldKind::U8, None),
            Err(MappingError::FieldOverlap { .. })
        ));
        assert!(matches!(
            packet.add_field("late", 3, FieldKind::U16, None),
            Err(MappingError::FieldOutOfBounds { .. })
        ));
        assert!(matches!(
            packet.add_field("id", 0, FieldKind::U8, None),
            Err(MappingError::ReservedOffset { .. })
        ));
        assert!(packet.add_field("c", 3, FieldKind::U8, Some(0x02)).is_ok());
    }

    #[test]
    fn huge_offset_is_out_of_bounds() {
        let mut packet = HidPacket::input("p", 0x01, 4);
        assert!(matches!(
            packet.add_field("x", usize::MAX, FieldKind::U16, None),
            Err(MappingError::FieldOutOfBounds { offset: usize::MAX, width: 2, .. })
        ));
        assert!(matches!(
            packet.add_field("y", usize::MAX - 1, FieldKind::U32, Some(0x0100)),
            Err(MappingError::FieldOutOfBounds { .. })
        ));
        assert!(packet.fields().is_empty());
    }

    #[test]
    fn short_reports_are_rejected() {
        let mut packet = buttons();
        assert!(matches!(
            packet.parse(&[0x01, 0x00]),
            Err(MappingError::ShortReport { expected: 4, got: 2, .. })
        ));
        assert_eq!(packet.value("knob").unwrap(), 0);
    }

    #[test]
    fn send_is_dirty_checked() {
        let mut out = RecordingReports::default();
        let mut packet = HidPacket::output("lights", 0x80, 3);
        packet.add_field("left", 1, FieldKind::U8, None).unwrap();
        packet.add_field("right", 2, FieldKind::U8, None).unwrap();

        packet.set_field("left", 0x7F).unwrap();
        assert!(packet.send(&mut out));
        assert!(!packet.send(&mut out));
        packet.set_field("right", 0x10).unwrap();
        assert!(packet.send(&mut out));
        assert_eq!(out.sent, vec![vec![0x80, 0x7F, 0x00], vec![0x80, 0x7F, 0x10]]);

        packet.clear(&mut out);
        packet.clear(&mut out);
        assert_eq!(out.sent.len(), 4);
        assert_eq!(out.sent[3], vec![0x80, 0x00, 0x00]);
        assert!(!packet.send(&mut out));
    }

    #[test]
    fn direction_is_enforced() {
        let mut input = buttons();
        assert!(matches!(input.set_field("a", 1), Err(MappingError::WrongDirection(_))));
        let mut output = HidPacket::output("lights", 0x80, 2);
        assert!(output.parse(&[0x80, 0x00]).is_err());
        assert!(matches!(output.set_field("nope", 1), Err(MappingError::UnknownField { .. })));
    }

    proptest! {
        #[test]
        fn staged_values_survive_serialization(
            word in 0i64..=0xFFFF,
            signed in -128i64..=127,
            lo in 0i64..=0x0F,
            hi in 0i64..=0x0F,
        ) {
            let mut out = HidPacket::output("out", 0x80, 5);
            out.add_field("word", 1, FieldKind::U16, None).unwrap();
            out.add_field("signed", 3, FieldKind::I8, None).unwrap();
            out.add_field("lo", 4, FieldKind::U8, Some(0x0F)).unwrap();
            out.add_field("hi", 4, FieldKind::U8, Some(0xF0)).unwrap();
            out.set_field("word", word).unwrap();
            out.set_field("signed", signed).unwrap();
            out.set_field("lo", lo).unwrap();
            out.set_field("hi", hi).unwrap();
            let bytes = out.serialize();
            prop_assert_eq!(bytes[0], 0x80);

            let mut input = HidPacket::input("in", 0x80, 5);
            input.add_field("word", 1, FieldKind::U16, None).unwrap();
            input.add_field("signed", 3, FieldKind::I8, None).unwrap();
            input.add_field("lo", 4, FieldKind::U8, Some(0x0F)).unwrap();
            input.add_field("hi", 4, FieldKind::U8, Some(0xF0)).unwrap();
            input.parse(&bytes).unwrap();
            prop_assert_eq!(input.value("word").unwrap(), word);
            prop_assert_eq!(input.value("signed").unwrap(), signed);
            prop_assert_eq!(input.value("lo").unwrap(), lo);
            prop_assert_eq!(input.value("hi").unwrap(), hi);
        }
    }
}
