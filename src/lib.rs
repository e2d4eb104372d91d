#![forbid(unsafe_code)]

//! Latest-uploads grid for a YouTube channel, built from the channel's public
//! feed instead of the Data API.

pub mod admin;
pub mod cache;
pub mod channel;
pub mod config;
pub mod feed;
pub mod fsutil;
pub mod logging;
pub mod render;
pub mod settings;
pub mod shortcode;
pub mod uploads;
pub mod video_id;
