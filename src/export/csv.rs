use std::borrow::Cow;

use chrono::DateTime;

use super::data::ExportableAnalyticsData;

/// Serialize an export into a flat CSV document with labeled sections: a
/// poll header, the summary metrics as Metric,Value pairs, then whichever
/// optional tables the data carries.
pub fn generate_csv(data: &ExportableAnalyticsData) -> String {
    let mut out = String::new();

    out.push_str("Poll Analytics Export\n");
    push_pair(&mut out, "Poll ID", &data.poll.id);
    push_pair(&mut out, "Question", &data.poll.question);
    push_pair(&mut out, "Poll Type", data.poll.poll_type.as_str());
    push_pair(&mut out, "Options", &data.poll.options.join(" | "));
    push_pair(&mut out, "Created At", &format_timestamp(data.poll.created_at));
    out.push('\n');

    let s = &data.summary;
    out.push_str("Summary\nMetric,Value\n");
    push_pair(&mut out, "Total Views", &s.total_views.to_string());
    push_pair(&mut out, "Unique Viewers", &s.unique_viewers.to_string());
    push_pair(&mut out, "Total Votes", &s.total_votes.to_string());
    push_pair(&mut out, "Total Shares", &s.total_shares.to_string());
    push_pair(&mut out, "Completion Rate", &format_rate(s.completion_rate));
    push_pair(&mut out, "Interaction Rate", &format_rate(s.interaction_rate));
    push_pair(&mut out, "Bounce Rate", &format_rate(s.bounce_rate));
    push_pair(&mut out, "Avg Time On Page", &format_seconds(s.avg_time_on_page));
    push_pair(&mut out, "Avg Time To Vote", &format_seconds(s.avg_time_to_vote));
    push_pair(&mut out, "Share To Vote Ratio", &format_rate(s.share_to_vote_ratio));
    push_pair(&mut out, "Return Visitor Rate", &format_rate(s.return_visitor_rate));
    push_pair(&mut out, "Viral Coefficient", &format_rate(s.viral_coefficient));
    push_pair(&mut out, "Peak Hour", &opt_display(&s.peak_hour));

    if let Some(countries) = &data.countries {
        out.push_str("\nCountries\nCountry,Views,Votes\n");
        for c in countries {
            push_row(
                &mut out,
                &[c.country_code.clone(), c.views.to_string(), c.votes.to_string()],
            );
        }
    }

    if let Some(devices) = &data.devices {
        out.push_str("\nDevices\nDevice,Views,Avg Time On Page,Bounce Rate\n");
        for d in devices {
            push_row(
                &mut out,
                &[
                    d.device_type.clone(),
                    d.views.to_string(),
                    format_seconds(d.avg_time_on_page),
                    format_rate(d.bounce_rate),
                ],
            );
        }
    }

    if let Some(daily) = &data.daily {
        out.push_str("\nDaily\nDate,Views,Unique Viewers,Votes,Shares,Clicks\n");
        for day in daily {
            push_row(
                &mut out,
                &[
                    day.date.to_string(),
                    day.views.to_string(),
                    day.unique_viewers.to_string(),
                    day.votes.to_string(),
                    day.shares.to_string(),
                    day.clicks.to_string(),
                ],
            );
        }
    }

    if let Some(raw) = &data.raw_events {
        out.push_str(
            "\nRaw Page Views\nCreated At,Visitor Hash,Session,Device,Browser,OS,Country,\
             Region,Referrer,UTM Source,UTM Medium,UTM Campaign,Time On Page,Scroll Depth\n",
        );
        for e in &raw.page_views {
            push_row(
                &mut out,
                &[
                    format_timestamp(e.created_at),
                    e.visitor_hash.clone(),
                    e.session_id.clone(),
                    e.device_type.clone(),
                    e.browser_family.clone(),
                    e.os_family.clone(),
                    opt_str(&e.country_code),
                    opt_str(&e.region_code),
                    opt_str(&e.referrer_domain),
                    opt_str(&e.utm_source),
                    opt_str(&e.utm_medium),
                    opt_str(&e.utm_campaign),
                    opt_display(&e.time_on_page),
                    opt_display(&e.scroll_depth),
                ],
            );
        }

        out.push_str(
            "\nRaw Votes\nCreated At,Vote ID,Option Index,Visitor Hash,Session,Device,\
             Browser,Country,Region,Time To Vote,First Vote,Previous Options\n",
        );
        for e in &raw.votes {
            let previous = e
                .previous_options_viewed
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(";");
            push_row(
                &mut out,
                &[
                    format_timestamp(e.created_at),
                    e.vote_id.clone(),
                    e.option_index.to_string(),
                    e.visitor_hash.clone(),
                    e.session_id.clone(),
                    e.device_type.clone(),
                    e.browser_family.clone(),
                    opt_str(&e.country_code),
                    opt_str(&e.region_code),
                    opt_display(&e.time_to_vote),
                    e.is_first_vote_in_session.to_string(),
                    previous,
                ],
            );
        }

        out.push_str(
            "\nRaw Shares\nCreated At,Platform,Method,Visitor Hash,Session,Device,Browser,\
             Country,Region,Shared URL\n",
        );
        for e in &raw.shares {
            push_row(
                &mut out,
                &[
                    format_timestamp(e.created_at),
                    e.platform.clone(),
                    e.share_method.clone(),
                    e.visitor_hash.clone(),
                    e.session_id.clone(),
                    e.device_type.clone(),
                    e.browser_family.clone(),
                    opt_str(&e.country_code),
                    opt_str(&e.region_code),
                    opt_str(&e.shared_url),
                ],
            );
        }
    }

    out
}

fn push_pair(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push(',');
    out.push_str(&escape(value));
    out.push('\n');
}

fn push_row(out: &mut String, fields: &[String]) {
    let escaped: Vec<String> = fields.iter().map(|f| escape(f).into_owned()).collect();
    out.push_str(&escaped.join(","));
    out.push('\n');
}

/// Quote a field when it contains a delimiter, quote or line break; inner
/// quotes are doubled per RFC 4180.
fn escape(field: &str) -> Cow<'_, str> {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn opt_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_display<T: std::fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn format_rate(value: f64) -> String {
    format!("{:.4}", value)
}

fn format_seconds(value: f64) -> String {
    format!("{:.2}", value)
}

fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::{PageViewEvent, PollAnalyticsSummary};
    use crate::export::data::RawEventRows;
    use crate::models::{Poll, PollType};

    fn base_data(question: &str) -> ExportableAnalyticsData {
        let mut summary = PollAnalyticsSummary::empty("p1");
        summary.total_views = 3;
        summary.total_votes = 1;
        summary.completion_rate = 1.0 / 3.0;

        ExportableAnalyticsData {
            poll: Poll {
                id: "p1".to_string(),
                question: question.to_string(),
                options: vec!["yes".to_string(), "no".to_string()],
                poll_type: PollType::Single,
                hide_results: false,
                is_active: true,
                created_at: 1_700_000_000,
            },
            summary,
            countries: None,
            daily: None,
            devices: None,
            raw_events: None,
        }
    }

    #[test]
    fn summary_csv_has_metric_pairs_and_no_tables() {
        let csv = generate_csv(&base_data("Favorite color?"));
        assert!(csv.starts_with("Poll Analytics Export\n"));
        assert!(csv.contains("Total Views,3\n"));
        assert!(csv.contains("Completion Rate,0.3333\n"));
        assert!(!csv.contains("Countries"));
        assert!(!csv.contains("Raw Page Views"));
    }

    #[test]
    fn fields_with_commas_and_quotes_are_escaped() {
        let csv = generate_csv(&base_data(r#"Tabs, or "spaces"?"#));
        assert!(csv.contains(r#"Question,"Tabs, or ""spaces""?""#));
    }

    #[test]
    fn raw_rows_are_dumped_with_headers() {
        let mut data = base_data("q");
        data.raw_events = Some(RawEventRows {
            page_views: vec![PageViewEvent {
                poll_id: "p1".to_string(),
                visitor_hash: "abc123".to_string(),
                session_id: "s1".to_string(),
                device_type: "mobile".to_string(),
                browser_family: "chrome".to_string(),
                os_family: "android".to_string(),
                country_code: Some("de".to_string()),
                region_code: None,
                referrer_domain: None,
                utm_source: None,
                utm_medium: None,
                utm_campaign: None,
                time_on_page: Some(12.5),
                scroll_depth: None,
                created_at: 1_700_000_000,
            }],
            votes: vec![],
            shares: vec![],
        });

        let csv = generate_csv(&data);
        assert!(csv.contains("Raw Page Views\nCreated At,"));
        assert!(csv.contains("abc123,s1,mobile,chrome,android,de,"));
        assert!(csv.contains("Raw Votes"));
        assert!(csv.contains("Raw Shares"));
    }
}
