use chrono::Utc;
use serde_json::Value;

use portal_core::Summary;

/// A prescription ready to be stored and announced to the patient. Rendering
/// to PDF happens outside this service; the report body is plain text.
#[derive(Debug)]
pub struct PrescriptionReport {
    pub reference: String,
    pub file_name: String,
    pub body: String,
    pub follow_up_message: String,
}

pub fn build_report(
    patient_name: &str,
    summary: Option<&Summary>,
    doctor_notes: &str,
    follow_up_days: u32,
) -> PrescriptionReport {
    let reference = format!("RX-{:08X}", rand::random::<u32>());
    let date = Utc::now().format("%Y-%m-%d").to_string();

    let mut body = format!(
        "PRESCRIPTION {reference}\nPatient: {patient_name}\nDate: {date}\n\n"
    );

    match summary {
        Some(summary) => {
            body.push_str("Session summary:\n");
            for (key, value) in summary.fields() {
                body.push_str(&format!("  {key}: {}\n", scalar_text(value)));
            }
            body.push('\n');
        }
        None => body.push_str("No AI summary was generated for this session.\n\n"),
    }

    body.push_str(&format!(
        "Doctor notes:\n{doctor_notes}\n\nFollow-up in {follow_up_days} days.\n"
    ));

    let file_name = format!("Prescription_{date}_{reference}.txt");
    let follow_up_message = format!(
        "*** AUTOMATED SYSTEM MESSAGE ***\n\
         Your doctor has issued a prescription. It is now available in your files.\n\
         A follow-up check-in has been scheduled for {follow_up_days} days from now."
    );

    PrescriptionReport {
        reference,
        file_name,
        body,
        follow_up_message,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_carries_notes_summary_and_follow_up() {
        let summary =
            Summary::from_reply(r#"{"chief_complaint": "migraine", "priority_score": 6}"#).unwrap();
        let report = build_report("Ada Lovelace", Some(&summary), "Take with food.", 14);

        assert!(report.body.contains("Ada Lovelace"));
        assert!(report.body.contains("chief_complaint: migraine"));
        assert!(report.body.contains("priority_score: 6"));
        assert!(report.body.contains("Take with food."));
        assert!(report.body.contains("Follow-up in 14 days."));
        assert!(report.follow_up_message.contains("14 days"));
    }

    #[test]
    fn report_without_summary_says_so() {
        let report = build_report("Ada Lovelace", None, "Rest.", 7);
        assert!(report.body.contains("No AI summary"));
    }

    #[test]
    fn reference_is_eight_hex_digits() {
        let report = build_report("Ada", None, "", 7);
        let digits = report.reference.strip_prefix("RX-").unwrap();
        assert_eq!(digits.len(), 8);
        assert!(digits.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(report.file_name.contains(&report.reference));
    }
}
