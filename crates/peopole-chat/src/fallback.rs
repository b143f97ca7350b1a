//! Apology messages used when the upstream model is unavailable.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use peopole_core::config::OrganizationConfig;
use peopole_core::types::Lang;

/// Picks a random apology in the requested language.
pub struct FallbackResponder {
    en: Vec<String>,
    bn: Vec<String>,
    rng: Mutex<StdRng>,
}

impl FallbackResponder {
    pub fn new(org: &OrganizationConfig) -> Self {
        Self::with_rng(org, StdRng::from_os_rng())
    }

    /// Deterministic selection for tests.
    pub fn with_seed(org: &OrganizationConfig, seed: u64) -> Self {
        Self::with_rng(org, StdRng::seed_from_u64(seed))
    }

    fn with_rng(org: &OrganizationConfig, rng: StdRng) -> Self {
        let wa = &org.whatsapp;
        Self {
            en: vec![
                format!(
                    "Sorry, I'm having trouble answering right now. Please try again in a \
                     moment, or message our counsellors on WhatsApp at {wa}."
                ),
                format!(
                    "Apologies, my connection dropped while preparing your answer. You can \
                     reach a human counsellor on WhatsApp at {wa} for immediate help."
                ),
                format!(
                    "I couldn't complete that reply. Please ask again shortly, or contact \
                     {name} on WhatsApp at {wa}.",
                    name = org.name
                ),
            ],
            bn: vec![
                format!(
                    "দুঃখিত, এই মুহূর্তে উত্তর দিতে সমস্যা হচ্ছে। একটু পরে আবার চেষ্টা করুন, অথবা \
                     WhatsApp {wa} নম্বরে আমাদের কাউন্সেলরদের মেসেজ দিন।"
                ),
                format!(
                    "আন্তরিকভাবে দুঃখিত, উত্তর তৈরির সময় সংযোগ বিচ্ছিন্ন হয়েছে। তাৎক্ষণিক সাহায্যের \
                     জন্য WhatsApp {wa} নম্বরে যোগাযোগ করুন।"
                ),
                format!(
                    "উত্তরটি সম্পূর্ণ করতে পারিনি। কিছুক্ষণ পর আবার জিজ্ঞাসা করুন, অথবা WhatsApp {wa} \
                     নম্বরে {name}-এর সাথে যোগাযোগ করুন।",
                    name = org.name
                ),
            ],
            rng: Mutex::new(rng),
        }
    }

    pub fn pool(&self, lang: Lang) -> &[String] {
        match lang {
            Lang::En => &self.en,
            Lang::Bn => &self.bn,
        }
    }

    /// Uniformly random message from the pool for `lang`.
    pub fn pick(&self, lang: Lang) -> String {
        let pool = self.pool(lang);
        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            rng.random_range(0..pool.len())
        };
        pool[index].clone()
    }
}
