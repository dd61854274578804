//! Template selection policy.
//!
//! Precedence, over the owner's templates in catalog (id) order:
//! 1. intent-linked: scope matches the channel and the template's
//!    category contains an intent with the exact detected name
//! 2. default template with matching scope
//! 3. any template with matching scope
//! 4. none

use crate::channels::Channel;
use crate::store::catalog::Intent;
use crate::store::templates::ResponseTemplate;

/// Pick the best template for a channel and optional detected intent.
///
/// `templates` must already be in catalog order; the first hit at each
/// precedence level wins, which makes the lowest id the tie-break.
pub fn select_template<'a>(
    templates: &'a [ResponseTemplate],
    catalog: &[Intent],
    channel: Channel,
    intent: Option<&Intent>,
) -> Option<&'a ResponseTemplate> {
    if let Some(intent) = intent {
        let linked = templates.iter().find(|t| {
            t.scope.matches(channel)
                && t.category_id.is_some_and(|category| {
                    catalog
                        .iter()
                        .any(|i| i.category_id == category && i.name == intent.name)
                })
        });
        if linked.is_some() {
            return linked;
        }
    }

    if let Some(default) = templates
        .iter()
        .find(|t| t.is_default && t.scope.matches(channel))
    {
        return Some(default);
    }

    templates.iter().find(|t| t.scope.matches(channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::templates::ChannelScope;

    fn template(
        id: i64,
        name: &str,
        scope: ChannelScope,
        is_default: bool,
        category_id: Option<i64>,
    ) -> ResponseTemplate {
        ResponseTemplate {
            id,
            owner: "alice".into(),
            name: name.into(),
            content: format!("content of {name}"),
            scope,
            is_default,
            category_id,
        }
    }

    fn intent(id: i64, category_id: i64, name: &str) -> Intent {
        Intent {
            id,
            category_id,
            name: name.into(),
            description: String::new(),
            keywords: String::new(),
        }
    }

    #[test]
    fn intent_linked_beats_default() {
        let templates = vec![
            template(1, "default", ChannelScope::Both, true, None),
            template(2, "greeting reply", ChannelScope::Email, false, Some(10)),
        ];
        let catalog = vec![intent(1, 10, "greeting")];
        let detected = intent(1, 10, "greeting");

        let picked =
            select_template(&templates, &catalog, Channel::Email, Some(&detected)).unwrap();
        assert_eq!(picked.name, "greeting reply");
    }

    #[test]
    fn intent_link_requires_exact_name() {
        let templates = vec![
            template(1, "default", ChannelScope::Both, true, None),
            template(2, "greeting reply", ChannelScope::Email, false, Some(10)),
        ];
        // Category 10 contains "greetings", not "greeting" — no link match
        let catalog = vec![intent(1, 10, "greetings")];
        let detected = intent(2, 11, "greeting");

        let picked =
            select_template(&templates, &catalog, Channel::Email, Some(&detected)).unwrap();
        assert_eq!(picked.name, "default");
    }

    #[test]
    fn intent_linked_respects_channel_scope() {
        let templates = vec![
            template(1, "default", ChannelScope::Both, true, None),
            template(2, "wa greeting", ChannelScope::Whatsapp, false, Some(10)),
        ];
        let catalog = vec![intent(1, 10, "greeting")];
        let detected = intent(1, 10, "greeting");

        // Email message cannot use the whatsapp-scoped linked template
        let picked =
            select_template(&templates, &catalog, Channel::Email, Some(&detected)).unwrap();
        assert_eq!(picked.name, "default");
    }

    #[test]
    fn no_intent_prefers_default() {
        let templates = vec![
            template(1, "plain", ChannelScope::Both, false, None),
            template(2, "default", ChannelScope::Email, true, None),
        ];
        let picked = select_template(&templates, &[], Channel::Email, None).unwrap();
        assert_eq!(picked.name, "default");
    }

    #[test]
    fn falls_back_to_first_scope_match() {
        let templates = vec![
            template(1, "wa only", ChannelScope::Whatsapp, false, None),
            template(2, "first email", ChannelScope::Email, false, None),
            template(3, "second email", ChannelScope::Email, false, None),
        ];
        let picked = select_template(&templates, &[], Channel::Email, None).unwrap();
        assert_eq!(picked.name, "first email");
    }

    #[test]
    fn none_when_no_scope_match() {
        let templates = vec![template(1, "wa only", ChannelScope::Whatsapp, false, None)];
        assert!(select_template(&templates, &[], Channel::Email, None).is_none());
    }

    #[test]
    fn none_when_empty() {
        assert!(select_template(&[], &[], Channel::Email, None).is_none());
    }
}
