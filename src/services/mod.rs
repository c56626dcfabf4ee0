// src/services/mod.rs
//
// Outbound collaborators: runtime settings, the exam registry crawler
// and the model endpoint used for extraction

pub mod crawler;
pub mod openai;
pub mod settings;

// Re-export commonly used types for convenience
pub use crawler::ExamRegistryCrawler;
pub use openai::OpenAIService;
pub use settings::SettingsService;
