// ABOUTME: Telephony provider integration modules
// ABOUTME: Webhook signature verification, recording download, and speech-to-text
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! Telephony provider integration
//!
//! Everything that talks to, or authenticates traffic from, the telephony
//! provider: webhook signature verification, authenticated recording
//! downloads, and the speech-to-text client used for voicemail transcription.

/// Authenticated recording downloads
pub mod recordings;

/// Webhook signature verification
pub mod signature;

/// Speech-to-text transcription client
pub mod transcription;

pub use recordings::{FetchedRecording, RecordingFetcher, RecordingSource};
pub use signature::{SignatureCheck, SignatureVerifier};
pub use transcription::{SpeechToText, WhisperTranscriber};
