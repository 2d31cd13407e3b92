//! Dashboard pages and per-user sessions.
//!
//! A page is a fixed list of reports rendered together for one date range.
//! Reports on a page are independent, so they run concurrently.

mod page;
mod session;

pub use page::{default_range, render_page, Page, PageReport, RenderedPage};
pub use session::DashboardSession;
