//! Terminal rendering for gateway results

pub mod render;
pub mod ui;

pub use render::{
    render_accounts, render_balance, render_health, render_institutions, render_transactions,
};
