use chrono::DateTime;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::data::ExportableAnalyticsData;

/// Serialize an export into a multi-sheet workbook: Summary always, then
/// Geographic/Devices/Daily when the data carries them, then one sheet per
/// raw event type.
pub fn generate_xlsx(data: &ExportableAnalyticsData) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    write_summary_sheet(workbook.add_worksheet(), data, &bold)?;

    if let Some(countries) = &data.countries {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Geographic")?;
        write_header(sheet, 0, &["Country", "Views", "Votes"], &bold)?;
        for (i, c) in countries.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, &c.country_code)?;
            sheet.write_number(row, 1, c.views as f64)?;
            sheet.write_number(row, 2, c.votes as f64)?;
        }
    }

    if let Some(devices) = &data.devices {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Devices")?;
        write_header(
            sheet,
            0,
            &["Device", "Views", "Avg Time On Page", "Bounce Rate"],
            &bold,
        )?;
        for (i, d) in devices.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, &d.device_type)?;
            sheet.write_number(row, 1, d.views as f64)?;
            sheet.write_number(row, 2, d.avg_time_on_page)?;
            sheet.write_number(row, 3, d.bounce_rate)?;
        }
    }

    if let Some(daily) = &data.daily {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Daily")?;
        write_header(
            sheet,
            0,
            &["Date", "Views", "Unique Viewers", "Votes", "Shares", "Clicks"],
            &bold,
        )?;
        for (i, day) in daily.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, day.date.to_string())?;
            sheet.write_number(row, 1, day.views as f64)?;
            sheet.write_number(row, 2, day.unique_viewers as f64)?;
            sheet.write_number(row, 3, day.votes as f64)?;
            sheet.write_number(row, 4, day.shares as f64)?;
            sheet.write_number(row, 5, day.clicks as f64)?;
        }
    }

    if let Some(raw) = &data.raw_events {
        write_raw_page_views(workbook.add_worksheet(), raw, &bold)?;
        write_raw_votes(workbook.add_worksheet(), raw, &bold)?;
        write_raw_shares(workbook.add_worksheet(), raw, &bold)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_summary_sheet(
    sheet: &mut Worksheet,
    data: &ExportableAnalyticsData,
    bold: &Format,
) -> Result<(), XlsxError> {
    sheet.set_name("Summary")?;
    sheet.write_string_with_format(0, 0, "Poll Analytics Export", bold)?;

    let poll = &data.poll;
    sheet.write_string(1, 0, "Poll ID")?;
    sheet.write_string(1, 1, &poll.id)?;
    sheet.write_string(2, 0, "Question")?;
    sheet.write_string(2, 1, &poll.question)?;
    sheet.write_string(3, 0, "Poll Type")?;
    sheet.write_string(3, 1, poll.poll_type.as_str())?;
    sheet.write_string(4, 0, "Options")?;
    sheet.write_string(4, 1, poll.options.join(" | "))?;
    sheet.write_string(5, 0, "Created At")?;
    sheet.write_string(5, 1, format_timestamp(poll.created_at))?;

    let s = &data.summary;
    write_header(sheet, 7, &["Metric", "Value"], bold)?;
    let metrics: [(&str, f64); 12] = [
        ("Total Views", s.total_views as f64),
        ("Unique Viewers", s.unique_viewers as f64),
        ("Total Votes", s.total_votes as f64),
        ("Total Shares", s.total_shares as f64),
        ("Completion Rate", s.completion_rate),
        ("Interaction Rate", s.interaction_rate),
        ("Bounce Rate", s.bounce_rate),
        ("Avg Time On Page", s.avg_time_on_page),
        ("Avg Time To Vote", s.avg_time_to_vote),
        ("Share To Vote Ratio", s.share_to_vote_ratio),
        ("Return Visitor Rate", s.return_visitor_rate),
        ("Viral Coefficient", s.viral_coefficient),
    ];
    for (i, (name, value)) in metrics.iter().enumerate() {
        let row = i as u32 + 8;
        sheet.write_string(row, 0, *name)?;
        sheet.write_number(row, 1, *value)?;
    }
    sheet.write_string(20, 0, "Peak Hour")?;
    if let Some(hour) = s.peak_hour {
        sheet.write_number(20, 1, hour as f64)?;
    }

    Ok(())
}

fn write_raw_page_views(
    sheet: &mut Worksheet,
    raw: &super::data::RawEventRows,
    bold: &Format,
) -> Result<(), XlsxError> {
    sheet.set_name("Page Views")?;
    write_header(
        sheet,
        0,
        &[
            "Created At",
            "Visitor Hash",
            "Session",
            "Device",
            "Browser",
            "OS",
            "Country",
            "Region",
            "Referrer",
            "UTM Source",
            "UTM Medium",
            "UTM Campaign",
            "Time On Page",
            "Scroll Depth",
        ],
        bold,
    )?;
    for (i, e) in raw.page_views.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, format_timestamp(e.created_at))?;
        sheet.write_string(row, 1, &e.visitor_hash)?;
        sheet.write_string(row, 2, &e.session_id)?;
        sheet.write_string(row, 3, &e.device_type)?;
        sheet.write_string(row, 4, &e.browser_family)?;
        sheet.write_string(row, 5, &e.os_family)?;
        write_opt_string(sheet, row, 6, &e.country_code)?;
        write_opt_string(sheet, row, 7, &e.region_code)?;
        write_opt_string(sheet, row, 8, &e.referrer_domain)?;
        write_opt_string(sheet, row, 9, &e.utm_source)?;
        write_opt_string(sheet, row, 10, &e.utm_medium)?;
        write_opt_string(sheet, row, 11, &e.utm_campaign)?;
        write_opt_number(sheet, row, 12, e.time_on_page)?;
        write_opt_number(sheet, row, 13, e.scroll_depth)?;
    }
    Ok(())
}

fn write_raw_votes(
    sheet: &mut Worksheet,
    raw: &super::data::RawEventRows,
    bold: &Format,
) -> Result<(), XlsxError> {
    sheet.set_name("Votes")?;
    write_header(
        sheet,
        0,
        &[
            "Created At",
            "Vote ID",
            "Option Index",
            "Visitor Hash",
            "Session",
            "Device",
            "Browser",
            "Country",
            "Region",
            "Time To Vote",
            "First Vote",
            "Previous Options",
        ],
        bold,
    )?;
    for (i, e) in raw.votes.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, format_timestamp(e.created_at))?;
        sheet.write_string(row, 1, &e.vote_id)?;
        sheet.write_number(row, 2, e.option_index as f64)?;
        sheet.write_string(row, 3, &e.visitor_hash)?;
        sheet.write_string(row, 4, &e.session_id)?;
        sheet.write_string(row, 5, &e.device_type)?;
        sheet.write_string(row, 6, &e.browser_family)?;
        write_opt_string(sheet, row, 7, &e.country_code)?;
        write_opt_string(sheet, row, 8, &e.region_code)?;
        write_opt_number(sheet, row, 9, e.time_to_vote)?;
        sheet.write_string(row, 10, if e.is_first_vote_in_session { "true" } else { "false" })?;
        let previous = e
            .previous_options_viewed
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(";");
        sheet.write_string(row, 11, previous)?;
    }
    Ok(())
}

fn write_raw_shares(
    sheet: &mut Worksheet,
    raw: &super::data::RawEventRows,
    bold: &Format,
) -> Result<(), XlsxError> {
    sheet.set_name("Shares")?;
    write_header(
        sheet,
        0,
        &[
            "Created At",
            "Platform",
            "Method",
            "Visitor Hash",
            "Session",
            "Device",
            "Browser",
            "Country",
            "Region",
            "Shared URL",
        ],
        bold,
    )?;
    for (i, e) in raw.shares.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, format_timestamp(e.created_at))?;
        sheet.write_string(row, 1, &e.platform)?;
        sheet.write_string(row, 2, &e.share_method)?;
        sheet.write_string(row, 3, &e.visitor_hash)?;
        sheet.write_string(row, 4, &e.session_id)?;
        sheet.write_string(row, 5, &e.device_type)?;
        sheet.write_string(row, 6, &e.browser_family)?;
        write_opt_string(sheet, row, 7, &e.country_code)?;
        write_opt_string(sheet, row, 8, &e.region_code)?;
        write_opt_string(sheet, row, 9, &e.shared_url)?;
    }
    Ok(())
}

fn write_header(
    sheet: &mut Worksheet,
    row: u32,
    headers: &[&str],
    bold: &Format,
) -> Result<(), XlsxError> {
    for (i, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(row, i as u16, *header, bold)?;
    }
    Ok(())
}

fn write_opt_string(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Option<String>,
) -> Result<(), XlsxError> {
    if let Some(v) = value {
        sheet.write_string(row, col, v)?;
    }
    Ok(())
}

fn write_opt_number(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<f64>,
) -> Result<(), XlsxError> {
    if let Some(v) = value {
        sheet.write_number(row, col, v)?;
    }
    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::{CountryStat, PollAnalyticsSummary, VoteEvent};
    use crate::export::data::RawEventRows;
    use crate::models::{Poll, PollType};

    fn data() -> ExportableAnalyticsData {
        ExportableAnalyticsData {
            poll: Poll {
                id: "p1".to_string(),
                question: "q".to_string(),
                options: vec!["a".to_string()],
                poll_type: PollType::Single,
                hide_results: false,
                is_active: true,
                created_at: 1_700_000_000,
            },
            summary: PollAnalyticsSummary::empty("p1"),
            countries: None,
            daily: None,
            devices: None,
            raw_events: None,
        }
    }

    #[test]
    fn summary_workbook_is_a_zip() {
        let bytes = generate_xlsx(&data()).unwrap();
        // xlsx files are zip containers
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn raw_workbook_includes_event_sheets() {
        let mut d = data();
        d.countries = Some(vec![CountryStat {
            country_code: "us".to_string(),
            views: 3,
            votes: 1,
        }]);
        d.raw_events = Some(RawEventRows {
            page_views: vec![],
            votes: vec![VoteEvent {
                poll_id: "p1".to_string(),
                vote_id: "v1".to_string(),
                option_index: 0,
                visitor_hash: "h".to_string(),
                session_id: "s".to_string(),
                device_type: "desktop".to_string(),
                browser_family: "firefox".to_string(),
                country_code: None,
                region_code: None,
                time_to_vote: Some(3.0),
                is_first_vote_in_session: true,
                previous_options_viewed: vec![1, 2],
                created_at: 1_700_000_000,
            }],
            shares: vec![],
        });

        let bytes = generate_xlsx(&d).unwrap();
        assert!(bytes.len() > 500);
    }
}
