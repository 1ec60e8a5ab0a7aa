//! User-visible strings, per language.
//!
//! Every text that can reach the delivery sink without coming from the model
//! is produced here, so no raw error or stack trace is ever shown.

use std::time::Duration;

use crate::domain::{FailureKind, Lang};

/// Short apologetic message for a failed answer.
pub fn friendly_error(kind: FailureKind, lang: Lang) -> &'static str {
    match (lang, kind) {
        (Lang::Ru, FailureKind::Timeout) => {
            "⌛ Источник долго отвечает. Попробуйте повторить запрос чуть позже."
        }
        (Lang::Ru, FailureKind::RateLimited) => {
            "⏳ Высокая нагрузка на модель. Повторите запрос через минуту."
        }
        (Lang::Ru, FailureKind::Auth) => "🔑 Проблема с ключом доступа к модели. Сообщите поддержке.",
        (Lang::Ru, FailureKind::Billing) => "💳 Исчерпан лимит оплаты модели. Сообщите поддержке.",
        (Lang::Ru, FailureKind::Unavailable) => {
            "☁️ Поставщик временно недоступен. Повторите запрос позже."
        }
        (Lang::Ru, FailureKind::Generic) => "Извините, не получилось получить ответ. Попробуйте ещё раз.",

        (Lang::Uz, FailureKind::Timeout) => {
            "⌛ Manba javob bermayapti. Birozdan so‘ng qayta urinib ko‘ring."
        }
        (Lang::Uz, FailureKind::RateLimited) => {
            "⏳ Modelga yuklama yuqori. Bir daqiqadan so‘ng urinib ko‘ring."
        }
        (Lang::Uz, FailureKind::Auth) => "🔑 Model kaliti bilan muammo. Texnik yordamga yozing.",
        (Lang::Uz, FailureKind::Billing) => "💳 Model to‘lovi limiti tugagan. Texnik yordamga yozing.",
        (Lang::Uz, FailureKind::Unavailable) => {
            "☁️ Xizmat vaqtincha ishlamayapti. Keyinroq urinib ko‘ring."
        }
        (Lang::Uz, FailureKind::Generic) => "Kechirasiz, hozir javob bera olmadim. Yana urinib ko‘ring.",

        (Lang::En, FailureKind::Timeout) => "⌛ The source is slow to respond. Please try again shortly.",
        (Lang::En, FailureKind::RateLimited) => "⏳ The model is under heavy load. Please retry in a minute.",
        (Lang::En, FailureKind::Auth) => "🔑 There is a problem with the model access key. Please contact support.",
        (Lang::En, FailureKind::Billing) => "💳 The model billing limit is exhausted. Please contact support.",
        (Lang::En, FailureKind::Unavailable) => {
            "☁️ The provider is temporarily unavailable. Please try again later."
        }
        (Lang::En, FailureKind::Generic) => "Sorry, I couldn't get an answer. Please try again.",
    }
}

/// Returned by the citation-required mode when no allowlisted source backs
/// the answer. Not an error: the question simply has no grounded answer.
pub fn no_authoritative_source(lang: Lang) -> &'static str {
    match lang {
        Lang::Ru => {
            "Не нашёл подтверждённой нормы в официальных источниках по вашему вопросу. \
             Уточните формулировку (название закона или кодекса, предмет регулирования) \
             или обратитесь к юристу."
        }
        Lang::Uz => {
            "Savolingiz bo‘yicha rasmiy manbalarda tasdiqlangan norma topilmadi. \
             Savolni aniqlashtiring (qonun yoki kodeks nomi) yoki yuristga murojaat qiling."
        }
        Lang::En => {
            "I couldn't confirm this against an authoritative source. \
             Please refine the question (name the law or code) or consult a lawyer."
        }
    }
}

/// Acknowledgement when the queue is short.
pub fn accepted(lang: Lang) -> &'static str {
    match lang {
        Lang::Ru => "🔎 Принял! Думаю над ответом — пришлю сообщение чуть позже.",
        Lang::Uz => "🔎 Qabul qildim! Fikr yuritayapman — javob tez orada keladi.",
        Lang::En => "🔎 Got it! Working on the answer, it will arrive shortly.",
    }
}

/// Acknowledgement with queue position and estimated wait.
pub fn queued(lang: Lang, position: usize, eta: Duration) -> String {
    let secs = eta.as_secs();
    match lang {
        Lang::Ru => format!(
            "⏳ Ваш запрос поставлен в очередь (№{position}). Ожидание ~ {secs} сек. Ответ придёт сюда."
        ),
        Lang::Uz => format!(
            "⏳ So‘rov navbatga qo‘yildi (№{position}). Taxminiy kutish ~ {secs} soniya. Javob shu yerga keladi."
        ),
        Lang::En => format!(
            "⏳ Your request is queued (#{position}). Estimated wait ~ {secs} s. The answer will arrive here."
        ),
    }
}

/// "Checked: <date>" line appended to answers grounded in fresh sources.
pub fn checked_stamp(lang: Lang, date: &str) -> String {
    match lang {
        Lang::Ru => format!("_Проверено: {date}_"),
        Lang::Uz => format!("_Tekshirildi: {date}_"),
        Lang::En => format!("_Checked: {date}_"),
    }
}

/// Heading of the sources block in cited answers.
pub fn sources_heading(lang: Lang) -> &'static str {
    match lang {
        Lang::Ru => "**Источники:**",
        Lang::Uz => "**Manbalar:**",
        Lang::En => "**Sources:**",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_failure_kind_has_text_in_every_language() {
        let kinds = [
            FailureKind::Timeout,
            FailureKind::RateLimited,
            FailureKind::Auth,
            FailureKind::Billing,
            FailureKind::Unavailable,
            FailureKind::Generic,
        ];
        for lang in [Lang::Ru, Lang::Uz, Lang::En] {
            for kind in kinds {
                assert!(!friendly_error(kind, lang).is_empty());
            }
        }
    }

    #[test]
    fn queued_message_mentions_position_and_eta() {
        let text = queued(Lang::En, 5, Duration::from_secs(12));
        assert!(text.contains("#5"));
        assert!(text.contains("12 s"));
    }

    #[test]
    fn checked_stamp_is_localized() {
        assert_eq!(checked_stamp(Lang::Ru, "01.02.2025"), "_Проверено: 01.02.2025_");
        assert_eq!(checked_stamp(Lang::En, "01.02.2025"), "_Checked: 01.02.2025_");
    }
}
