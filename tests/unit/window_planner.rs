//! Window planning over fixed dates

use chrono::{Days, NaiveDate};
use tap_applovin::window::{ExtractionWindow, PlannerConfig, WindowPlan};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn config(report_range_days: u32, overlap_days: u32, window_days: u32) -> PlannerConfig {
    PlannerConfig {
        report_range_days,
        start_date: None,
        end_date: None,
        overlap_days,
        window_days,
    }
}

#[test]
fn test_three_day_range_without_bookmark() {
    let plan = WindowPlan::new(&config(3, 0, 1), None, date(2024, 1, 10));
    let windows: Vec<_> = plan.iter().collect();

    assert_eq!(
        windows,
        vec![
            ExtractionWindow::new(date(2024, 1, 7), date(2024, 1, 8)).unwrap(),
            ExtractionWindow::new(date(2024, 1, 8), date(2024, 1, 9)).unwrap(),
            ExtractionWindow::new(date(2024, 1, 9), date(2024, 1, 10)).unwrap(),
        ]
    );
}

#[test]
fn test_bookmark_with_overlap_yields_single_window() {
    let plan = WindowPlan::new(&config(30, 1, 1), Some(date(2024, 1, 9)), date(2024, 1, 10));
    let windows: Vec<_> = plan.iter().collect();

    assert_eq!(
        windows,
        vec![ExtractionWindow::new(date(2024, 1, 8), date(2024, 1, 10)).unwrap()]
    );
}

#[test]
fn test_bookmark_in_future_plans_nothing() {
    let plan = WindowPlan::new(&config(3, 2, 1), Some(date(2024, 2, 1)), date(2024, 1, 10));
    // Overlap rewinds to 01-30 which is still past today
    assert!(plan.is_empty());
    assert_eq!(plan.iter().count(), 0);
}

#[test]
fn test_windows_tile_the_range_for_many_inputs() {
    let today = date(2024, 3, 1);
    for range in [1u32, 2, 7, 31, 90] {
        for overlap in [0u32, 1, 3] {
            for width in [1u32, 2, 7] {
                for bookmark in [None, Some(date(2024, 2, 20)), Some(date(2024, 2, 29))] {
                    let plan = WindowPlan::new(&config(range, overlap, width), bookmark, today);
                    let windows: Vec<_> = plan.iter().collect();

                    if plan.is_empty() {
                        assert!(windows.is_empty());
                        continue;
                    }
                    assert_eq!(windows.first().unwrap().start, plan.start());
                    assert_eq!(windows.last().unwrap().end, plan.end());
                    for pair in windows.windows(2) {
                        assert_eq!(pair[0].end, pair[1].start, "gap or overlap in {pair:?}");
                    }
                    for window in &windows {
                        assert!(window.start < window.end);
                        assert!(window.end <= today);
                    }
                    assert_eq!(plan.len(), windows.len());
                }
            }
        }
    }
}

#[test]
fn test_never_requests_today() {
    let today = date(2024, 1, 10);
    let cfg = PlannerConfig {
        end_date: Some(today.checked_add_days(Days::new(5)).unwrap()),
        ..config(3, 0, 1)
    };
    let plan = WindowPlan::new(&cfg, None, today);
    assert_eq!(plan.end(), today);
    assert!(plan.iter().all(|w| !w.contains(today)));
}
