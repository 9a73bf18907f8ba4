/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Timestamp formatting for asset metadata and HTTP headers.

use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// `Mon Oct 19 09:05:01 2026`, the layout the front-end shows as generation time.
const CTIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
);

/// IMF-fixdate, as required for `Last-Modified`.
const HTTP_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

pub fn ctime(at: OffsetDateTime) -> String {
    at.format(CTIME_FORMAT).unwrap_or_default()
}

/// The wall clock of the local offset. Falls back to UTC when the offset
/// cannot be determined, e.g. once other threads are running on Unix.
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|e| {
        log::debug!("clock: local offset unavailable ({e}); using UTC");
        OffsetDateTime::now_utc()
    })
}

pub fn ctime_now() -> String {
    ctime(now_local())
}

pub fn http_date(at: OffsetDateTime) -> String {
    at.to_offset(time::UtcOffset::UTC)
        .format(HTTP_DATE_FORMAT)
        .unwrap_or_default()
}

pub fn http_date_now() -> String {
    http_date(OffsetDateTime::now_utc())
}
