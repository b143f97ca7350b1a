//! Keyword FAQ short-circuit.
//!
//! Common questions are answered from a fixed table instead of calling the
//! upstream model. Matching is plain case-insensitive substring containment
//! over each entry's keyword list; the first entry in table order that has
//! any hit wins. There is no ranking, stemming or tokenization, so keyword
//! lists carry their own synonyms and transliterations.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use peopole_core::config::OrganizationConfig;
use peopole_core::error::{PeopoleError, Result};
use peopole_core::types::Lang;

/// Answer text per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqAnswers {
    pub en: String,
    pub bn: String,
}

impl FaqAnswers {
    pub fn get(&self, lang: Lang) -> &str {
        match lang {
            Lang::En => &self.en,
            Lang::Bn => &self.bn,
        }
    }
}

/// One canned answer and the keywords that trigger it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub keywords: Vec<String>,
    pub answers: FaqAnswers,
}

impl FaqEntry {
    fn new(keywords: &[&str], en: String, bn: String) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            answers: FaqAnswers { en, bn },
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

/// Immutable FAQ table.
#[derive(Debug, Clone)]
pub struct FaqMatcher {
    entries: Vec<FaqEntry>,
}

impl FaqMatcher {
    /// Build a matcher over `entries`, in the given order.
    ///
    /// Keywords are lower-cased and blank keywords dropped.
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|mut entry| {
                entry.keywords = entry
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                entry
            })
            .collect();
        Self { entries }
    }

    /// The built-in table with contact details taken from `org`.
    pub fn builtin(org: &OrganizationConfig) -> Self {
        Self::new(builtin_entries(org))
    }

    /// Load a replacement table from a JSON array of [`FaqEntry`].
    pub fn from_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<FaqEntry> = serde_json::from_str(&content).map_err(|e| {
            PeopoleError::Config(format!("invalid FAQ table {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), entries = entries.len(), "Loaded FAQ table");
        Ok(Self::new(entries))
    }

    /// Answer for the first entry with a keyword contained in `text`.
    pub fn lookup(&self, text: &str, lang: Lang) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.matches(&lowered))
            .map(|entry| entry.answers.get(lang))
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn builtin_entries(org: &OrganizationConfig) -> Vec<FaqEntry> {
    vec![
        // Pricing
        FaqEntry::new(
            &[
                "cost", "price", "pricing", "fees", "how much", "charge", "package",
                "koto taka", "khoroch", "খরচ", "দাম", "ফি কত", "কত টাকা", "প্যাকেজ",
            ],
            format!(
                "Our initial consultation fee is {fee}. Full processing packages depend on the \
                 country, course level and visa type, so we share an exact quote after reviewing \
                 your profile. University application fees and embassy visa fees are paid \
                 separately to the institution or embassy. Message us on WhatsApp at {wa} for a \
                 personalised quote.",
                fee = org.consultation_fee,
                wa = org.whatsapp,
            ),
            format!(
                "আমাদের প্রাথমিক কনসালটেশন ফি {fee}। সম্পূর্ণ প্রসেসিং প্যাকেজের খরচ দেশ, কোর্সের স্তর \
                 এবং ভিসার ধরনের উপর নির্ভর করে, তাই আপনার প্রোফাইল দেখে আমরা সঠিক খরচ জানাই। \
                 বিশ্ববিদ্যালয়ের আবেদন ফি এবং দূতাবাসের ভিসা ফি আলাদাভাবে সংশ্লিষ্ট প্রতিষ্ঠানে দিতে হয়। \
                 বিস্তারিত জানতে WhatsApp করুন {wa} নম্বরে।",
                fee = org.consultation_fee,
                wa = org.whatsapp,
            ),
        ),
        // Contact
        FaqEntry::new(
            &[
                "contact", "whatsapp", "phone number", "call you", "reach you", "email",
                "যোগাযোগ", "ফোন", "হোয়াটসঅ্যাপ", "ইমেইল",
            ],
            format!(
                "You can reach {name} on WhatsApp at {wa}, by phone at {phone}, or by email at \
                 {email}. WhatsApp is the fastest way to get a reply from our counsellors.",
                name = org.name,
                wa = org.whatsapp,
                phone = org.phone,
                email = org.email,
            ),
            format!(
                "{name}-এর সাথে যোগাযোগ করুন: WhatsApp {wa}, ফোন {phone}, ইমেইল {email}। \
                 দ্রুত উত্তরের জন্য WhatsApp সবচেয়ে ভালো মাধ্যম।",
                name = org.name,
                wa = org.whatsapp,
                phone = org.phone,
                email = org.email,
            ),
        ),
        // Office hours
        FaqEntry::new(
            &[
                "office hours", "opening hours", "open today", "timing", "when are you open",
                "working hours", "সময়সূচি", "কখন খোলা", "খোলা থাকে", "অফিস টাইম",
            ],
            format!(
                "Our office is open {hours}. You can message us on WhatsApp at {wa} any time and \
                 we will reply during office hours.",
                hours = org.office_hours,
                wa = org.whatsapp,
            ),
            format!(
                "আমাদের অফিস খোলা থাকে: {hours}। যেকোনো সময় WhatsApp {wa} নম্বরে মেসেজ দিন, \
                 অফিস সময়ে আমরা উত্তর দেব।",
                hours = org.office_hours,
                wa = org.whatsapp,
            ),
        ),
        // Location
        FaqEntry::new(
            &[
                "address", "location", "where is your office", "where are you located",
                "office located", "visit your office", "ঠিকানা", "অফিস কোথায়", "কোথায় অবস্থিত",
            ],
            format!(
                "Our office is at {address}. Please call {phone} before visiting so a counsellor \
                 is available for you.",
                address = org.address,
                phone = org.phone,
            ),
            format!(
                "আমাদের অফিসের ঠিকানা: {address}। আসার আগে {phone} নম্বরে কল করে নিলে একজন \
                 কাউন্সেলর আপনার জন্য প্রস্তুত থাকবেন।",
                address = org.address,
                phone = org.phone,
            ),
        ),
        // Payment
        FaqEntry::new(
            &[
                "payment", "how do i pay", "how can i pay", "bkash", "nagad", "bank transfer",
                "installment",
                "পেমেন্ট", "বিকাশ", "নগদ", "পরিশোধ", "কিস্তি",
            ],
            format!(
                "We accept {methods}. Every payment is confirmed with a receipt. Contact us on \
                 WhatsApp at {wa} before sending money so we can share the correct account details.",
                methods = org.payment_methods,
                wa = org.whatsapp,
            ),
            format!(
                "আমরা পেমেন্ট গ্রহণ করি: {methods}। প্রতিটি পেমেন্টের রসিদ দেওয়া হয়। টাকা পাঠানোর আগে \
                 সঠিক অ্যাকাউন্টের তথ্যের জন্য WhatsApp {wa} নম্বরে যোগাযোগ করুন।",
                methods = org.payment_methods,
                wa = org.whatsapp,
            ),
        ),
        // English tests
        FaqEntry::new(
            &[
                "ielts", "toefl", "pte academic", "duolingo", "english test", "band score",
                "আইইএলটিএস", "ইংরেজি পরীক্ষা",
            ],
            "Most universities ask for IELTS Academic 6.0 to 6.5 overall for undergraduate \
             study and 6.5 to 7.0 for postgraduate study, usually with no band below 5.5 or 6.0. \
             PTE, TOEFL iBT and Duolingo are accepted by many institutions. Some universities \
             waive the test if your previous degree was taught in English. Tell us your target \
             country and course and we will check the exact requirement."
                .to_string(),
            "বেশিরভাগ বিশ্ববিদ্যালয়ে স্নাতক পর্যায়ে IELTS Academic ওভারঅল ৬.০ থেকে ৬.৫ এবং \
             স্নাতকোত্তর পর্যায়ে ৬.৫ থেকে ৭.০ প্রয়োজন হয়, সাধারণত কোনো ব্যান্ড ৫.৫ বা ৬.০-এর নিচে নয়। \
             অনেক প্রতিষ্ঠান PTE, TOEFL iBT এবং Duolingo গ্রহণ করে। আগের ডিগ্রি ইংরেজি মাধ্যমে হলে \
             কিছু বিশ্ববিদ্যালয় পরীক্ষা ছাড় দেয়। আপনার দেশ ও কোর্স জানালে আমরা সঠিক শর্ত যাচাই করে দেব।"
                .to_string(),
        ),
        // Scholarships
        FaqEntry::new(
            &[
                "scholarship", "funding", "stipend", "tuition waiver", "বৃত্তি", "স্কলারশিপ",
            ],
            "Scholarships range from partial tuition waivers of 10% to 50% to fully funded \
             awards that cover tuition and living costs. Strong academic results, a good IELTS \
             score and an early application improve your chances. Research degrees are often \
             funded through a supervisor. Share your latest results and we will shortlist \
             scholarships you are eligible for."
                .to_string(),
            "স্কলারশিপ ১০% থেকে ৫০% টিউশন ফি ছাড় থেকে শুরু করে টিউশন ও থাকার খরচসহ সম্পূর্ণ \
             ফান্ডেড পর্যন্ত হয়। ভালো ফলাফল, ভালো IELTS স্কোর এবং আগেভাগে আবেদন করলে সম্ভাবনা বাড়ে। \
             গবেষণা ডিগ্রিতে প্রায়ই সুপারভাইজারের মাধ্যমে ফান্ডিং পাওয়া যায়। আপনার সর্বশেষ ফলাফল \
             জানালে আমরা উপযুক্ত স্কলারশিপের তালিকা করে দেব।"
                .to_string(),
        ),
        // Processing time
        FaqEntry::new(
            &[
                "processing time", "how long", "how many days", "how many weeks", "visa time",
                "কত দিন", "কতদিন", "সময় লাগে",
            ],
            "Admission offers usually take 2 to 6 weeks after a complete application. Student \
             visa decisions typically take 3 to 8 weeks depending on the country and season. \
             We recommend starting at least 6 months before your intake. Timelines are set by \
             universities and embassies and can change."
                .to_string(),
            "সম্পূর্ণ আবেদন জমার পর অফার লেটার পেতে সাধারণত ২ থেকে ৬ সপ্তাহ লাগে। স্টুডেন্ট ভিসার \
             সিদ্ধান্ত দেশ ও মৌসুমভেদে সাধারণত ৩ থেকে ৮ সপ্তাহ লাগে। ইনটেকের অন্তত ৬ মাস আগে শুরু করার \
             পরামর্শ দিই। সময়সীমা বিশ্ববিদ্যালয় ও দূতাবাস নির্ধারণ করে এবং তা পরিবর্তন হতে পারে।"
                .to_string(),
        ),
        // Documents
        FaqEntry::new(
            &[
                "documents", "document", "papers", "checklist", "requirements", "কাগজপত্র",
                "ডকুমেন্ট",
            ],
            "A typical student file needs your passport, academic certificates and transcripts, \
             an English test result, a statement of purpose, recommendation letters, a CV, and \
             bank statements with sponsor documents showing you can cover tuition and living \
             costs. Each country adds its own forms, and we give you a personalised checklist \
             once we know your destination."
                .to_string(),
            "সাধারণত প্রয়োজন হয়: পাসপোর্ট, একাডেমিক সার্টিফিকেট ও ট্রান্সক্রিপ্ট, ইংরেজি পরীক্ষার \
             ফলাফল, স্টেটমেন্ট অব পারপাস, রিকমেন্ডেশন লেটার, সিভি, এবং টিউশন ও থাকার খরচ বহনের \
             সামর্থ্য দেখাতে ব্যাংক স্টেটমেন্ট ও স্পন্সরের কাগজপত্র। প্রতিটি দেশের নিজস্ব ফর্মও থাকে; \
             গন্তব্য জানালে আমরা আপনাকে ব্যক্তিগত চেকলিস্ট দেব।"
                .to_string(),
        ),
        // Destinations
        FaqEntry::new(
            &[
                "countries", "which country", "destination", "study abroad", "কোন দেশ",
                "কোন কোন দেশ", "বিদেশে পড়া",
            ],
            "We help students apply to the UK, Canada, Australia, the USA, New Zealand, Ireland, \
             Germany, Malaysia and several other European and Asian destinations. The best \
             choice depends on your budget, academic profile and long-term plans, so let us know \
             those and we will suggest a shortlist."
                .to_string(),
            "আমরা যুক্তরাজ্য, কানাডা, অস্ট্রেলিয়া, যুক্তরাষ্ট্র, নিউজিল্যান্ড, আয়ারল্যান্ড, জার্মানি, \
             মালয়েশিয়াসহ ইউরোপ ও এশিয়ার আরও কয়েকটি দেশে আবেদনে সহায়তা করি। আপনার বাজেট, একাডেমিক \
             প্রোফাইল ও ভবিষ্যৎ পরিকল্পনা জানালে আমরা উপযুক্ত দেশের তালিকা দেব।"
                .to_string(),
        ),
        // Services
        FaqEntry::new(
            &[
                "services", "what do you do", "what do you offer", "how can you help",
                "সেবা", "সার্ভিস", "কী কী সাহায্য",
            ],
            format!(
                "{name} offers career counselling, university and course selection, application \
                 processing, scholarship guidance, statement of purpose review, visa file \
                 preparation, interview practice and pre-departure briefings. Tell me your stage \
                 of study and I can point you to the right service.",
                name = org.name,
            ),
            format!(
                "{name} যে সেবাগুলো দেয়: ক্যারিয়ার কাউন্সেলিং, বিশ্ববিদ্যালয় ও কোর্স নির্বাচন, আবেদন \
                 প্রসেসিং, স্কলারশিপ গাইডেন্স, স্টেটমেন্ট অব পারপাস রিভিউ, ভিসা ফাইল প্রস্তুতি, \
                 ইন্টারভিউ প্র্যাকটিস এবং যাত্রার আগের ব্রিফিং। আপনার পড়াশোনার স্তর জানালে সঠিক সেবার \
                 কথা বলতে পারব।",
                name = org.name,
            ),
        ),
        // Identity
        FaqEntry::new(
            &[
                "who are you", "your name", "are you a bot", "are you human", "are you ai",
                "তুমি কে", "আপনি কে", "আপনার নাম",
            ],
            format!(
                "I'm {assistant}, the virtual assistant of {name} in {city}. I can answer \
                 questions about study abroad, scholarships and visas. For anything personal or \
                 urgent our human counsellors are on WhatsApp at {wa}.",
                assistant = org.assistant_name,
                name = org.name,
                city = org.city,
                wa = org.whatsapp,
            ),
            format!(
                "আমি {assistant}, {city}-এর {name}-এর ভার্চুয়াল সহকারী। বিদেশে পড়াশোনা, স্কলারশিপ ও \
                 ভিসা নিয়ে প্রশ্নের উত্তর দিতে পারি। ব্যক্তিগত বা জরুরি বিষয়ে আমাদের কাউন্সেলরদের সাথে \
                 WhatsApp {wa} নম্বরে কথা বলুন।",
                assistant = org.assistant_name,
                name = org.name,
                city = org.city,
                wa = org.whatsapp,
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn matcher() -> FaqMatcher {
        FaqMatcher::builtin(&OrganizationConfig::default())
    }

    #[test]
    fn test_builtin_table_size() {
        let faq = matcher();
        assert_eq!(faq.len(), 12);
        for entry in faq.entries() {
            assert!(!entry.keywords.is_empty());
            assert!(!entry.answers.en.is_empty());
            assert!(!entry.answers.bn.is_empty());
        }
    }

    #[test]
    fn test_pricing_question() {
        let faq = matcher();
        let answer = faq.lookup("how much does it cost", Lang::En).unwrap();
        assert_eq!(answer, faq.entries()[0].answers.en);
        assert!(answer.contains("BDT 2,000"));
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let faq = matcher();
        assert_eq!(
            faq.lookup("WHAT IS YOUR WHATSAPP?", Lang::En),
            Some(faq.entries()[1].answers.en.as_str())
        );
    }

    #[test]
    fn test_answer_follows_requested_language() {
        let faq = matcher();
        let answer = faq.lookup("IELTS score?", Lang::Bn).unwrap();
        assert_eq!(answer, faq.entries()[5].answers.bn);
    }

    #[test]
    fn test_bengali_keyword() {
        let faq = matcher();
        let answer = faq.lookup("স্কলারশিপ পাওয়া যাবে?", Lang::Bn).unwrap();
        assert_eq!(answer, faq.entries()[6].answers.bn);
    }

    #[test]
    fn test_first_entry_in_table_order_wins() {
        let faq = matcher();
        // Hits both pricing ("cost") and scholarships.
        let answer = faq
            .lookup("what is the cost after a scholarship", Lang::En)
            .unwrap();
        assert_eq!(answer, faq.entries()[0].answers.en);
    }

    #[test]
    fn test_no_keyword_is_shadowed_by_an_earlier_entry() {
        let faq = matcher();
        for (index, entry) in faq.entries().iter().enumerate() {
            for keyword in &entry.keywords {
                let hit = faq
                    .entries()
                    .iter()
                    .position(|e| e.matches(keyword))
                    .unwrap();
                assert_eq!(hit, index, "keyword {keyword:?} is answered by entry {hit}");
            }
        }
    }

    #[test]
    fn test_no_match() {
        let faq = matcher();
        assert!(faq.lookup("tell me a joke about penguins", Lang::En).is_none());
        assert!(faq.lookup("", Lang::Bn).is_none());
    }

    #[test]
    fn test_contact_details_rendered_from_config() {
        let org = OrganizationConfig {
            whatsapp: "+8801999999999".to_string(),
            ..Default::default()
        };
        let faq = FaqMatcher::builtin(&org);
        let answer = faq.lookup("contact", Lang::En).unwrap();
        assert!(answer.contains("+8801999999999"));
    }

    #[test]
    fn test_new_normalizes_keywords() {
        let faq = FaqMatcher::new(vec![FaqEntry {
            keywords: vec!["  Hostel ".to_string(), "".to_string(), "   ".to_string()],
            answers: FaqAnswers {
                en: "We help with housing.".to_string(),
                bn: "আমরা থাকার ব্যবস্থায় সাহায্য করি।".to_string(),
            },
        }]);
        assert_eq!(faq.entries()[0].keywords, vec!["hostel".to_string()]);
        assert_eq!(
            faq.lookup("Any HOSTEL options?", Lang::En),
            Some("We help with housing.")
        );
        // A blank keyword must not match everything.
        assert!(faq.lookup("something else", Lang::En).is_none());
    }

    #[test]
    fn test_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"keywords": ["Visa Fee"], "answers": {{"en": "It varies.", "bn": "ভিন্ন হয়।"}}}}]"#
        )
        .unwrap();

        let faq = FaqMatcher::from_json(file.path()).unwrap();
        assert_eq!(faq.len(), 1);
        assert_eq!(faq.lookup("what is the visa fee", Lang::Bn), Some("ভিন্ন হয়।"));
    }

    #[test]
    fn test_from_json_rejects_invalid_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"not\": \"a list\"}}").unwrap();
        assert!(matches!(
            FaqMatcher::from_json(file.path()),
            Err(PeopoleError::Config(_))
        ));
    }
}
