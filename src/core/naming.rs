use crate::domain::model::{DateRange, StatementFormat, DATE_FORMAT};

/// `<start>-<end>` with ISO dates, shared by every artifact of a run.
pub fn base_name(range: &DateRange) -> String {
    format!(
        "{}-{}",
        range.start().format(DATE_FORMAT),
        range.end().format(DATE_FORMAT)
    )
}

/// 產生輸出檔名：`<start:YYYY-MM-DD>-<end:YYYY-MM-DD>.<ext>`
pub fn name(range: &DateRange, format: StatementFormat) -> String {
    format!("{}.{}", base_name(range), format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_uses_zero_padded_iso_dates() {
        let range = DateRange::parse("2024-01-05", "2024-02-09").unwrap();
        assert_eq!(name(&range, StatementFormat::Pdf), "2024-01-05-2024-02-09.pdf");
        assert_eq!(name(&range, StatementFormat::Ofx), "2024-01-05-2024-02-09.ofx");
    }

    #[test]
    fn test_name_is_deterministic_across_formats() {
        let range = DateRange::parse("2023-12-01", "2023-12-31").unwrap();
        let pdf = name(&range, StatementFormat::Pdf);
        let ofx = name(&range, StatementFormat::Ofx);
        assert_eq!(pdf.trim_end_matches(".pdf"), ofx.trim_end_matches(".ofx"));
        assert_eq!(base_name(&range), "2023-12-01-2023-12-31");
    }
}
