//! Fakes and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::providers::{ChatModel, ChatOptions, Embedder, ProviderError};

const VOCAB: &[&str] = &["solar", "wind", "coal", "hydro", "nuclear", "grid", "tariff", "storage"];

/// Bag-of-words embedding over a tiny vocabulary, plus a constant last
/// component so no vector is ever zero.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCAB.iter().map(|w| lower.matches(w).count() as f32).collect();
    v.push(0.01);
    v
}

/// Records every batch it is asked to embed.
#[derive(Default)]
pub struct FakeEmbedder {
    pub calls: Mutex<Vec<Vec<String>>>,
    /// Fail the call with this 0-based number.
    pub fail_on_call: Option<usize>,
}

impl FakeEmbedder {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|c| c.len()).collect()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut calls = self.calls.lock().unwrap();
        let n = calls.len();
        calls.push(texts.to_vec());
        if self.fail_on_call == Some(n) {
            return Err(ProviderError::Status {
                status: 429,
                body: "quota exceeded".into(),
            });
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Returns scripted replies in order and records each prompt.
#[derive(Default)]
pub struct FakeChat {
    pub replies: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<(String, ChatOptions)>>,
    pub fail: bool,
}

impl FakeChat {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<(String, ChatOptions)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, prompt: &str, options: &ChatOptions) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push((prompt.to_string(), *options));
        if self.fail {
            return Err(ProviderError::Status {
                status: 401,
                body: "bad key".into(),
            });
        }
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// A small but valid PDF with one line of Helvetica text per page.
pub fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), n),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let stream = format!("BT /F1 12 Tf 72 712 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    let header = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    out.extend_from_slice(header.as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}
