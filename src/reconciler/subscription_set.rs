use std::collections::{BTreeSet, HashMap};

const CHANNEL_PREFIX: &str = "phone:";

pub fn channel_name(phone_id: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, phone_id)
}

pub fn phone_id_from_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix(CHANNEL_PREFIX).filter(|phone_id| !phone_id.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Subscribing,
    Subscribed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    channel: String,
    state: SubscriptionState,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }
}

/// Active channel per phone id.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    by_phone: HashMap<String, Subscription>,
}

pub struct SubscriptionDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SubscriptionSet {
    pub fn diff(&self, requested: &BTreeSet<String>) -> SubscriptionDiff {
        let added = requested.iter().filter(|phone_id| !self.by_phone.contains_key(*phone_id)).cloned().collect();
        let mut removed = self
            .by_phone
            .keys()
            .filter(|phone_id| !requested.contains(*phone_id))
            .cloned()
            .collect::<Vec<_>>();
        removed.sort();

        SubscriptionDiff { added, removed }
    }

    pub fn insert(&mut self, phone_id: &str) -> &Subscription {
        self.by_phone.entry(phone_id.to_string()).or_insert_with(|| Subscription {
            channel: channel_name(phone_id),
            state: SubscriptionState::Subscribing,
        })
    }

    pub fn remove(&mut self, phone_id: &str) -> Option<Subscription> {
        self.by_phone.remove(phone_id)
    }

    pub fn get(&self, phone_id: &str) -> Option<&Subscription> {
        self.by_phone.get(phone_id)
    }

    /// Returns false when the phone is not tracked (anymore).
    pub fn mark_subscribed(&mut self, phone_id: &str) -> bool {
        match self.by_phone.get_mut(phone_id) {
            Some(subscription) => {
                subscription.state = SubscriptionState::Subscribed;
                true
            }
            None => false,
        }
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (String, Subscription)> + '_ {
        self.by_phone.drain()
    }

    pub fn clear(&mut self) {
        self.by_phone.clear();
    }

    #[cfg(test)]
    pub fn phone_ids(&self) -> BTreeSet<String> {
        self.by_phone.keys().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_phone.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_phone.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn set_of(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[rstest]
    #[case("phone:A", Some("A"))]
    #[case("phone:8f2c-11", Some("8f2c-11"))]
    #[case("phone:", None)]
    #[case("device:A", None)]
    fn phone_id_from_channel_strips_the_prefix(#[case] channel: &str, #[case] expected: Option<&str>) {
        assert_eq!(phone_id_from_channel(channel), expected);
    }

    #[test]
    fn channel_name_prefixes_the_phone_id() {
        assert_eq!(channel_name("A"), "phone:A");
    }

    #[test]
    fn diff_returns_missing_and_obsolete_phones() {
        let mut subscriptions = SubscriptionSet::default();
        subscriptions.insert("A");
        subscriptions.insert("B");

        let diff = subscriptions.diff(&set_of(&["B", "C"]));

        assert_eq!(diff.added, vec!["C".to_string()]);
        assert_eq!(diff.removed, vec!["A".to_string()]);
    }

    #[test]
    fn insert_never_replaces_an_existing_subscription() {
        let mut subscriptions = SubscriptionSet::default();
        subscriptions.insert("A");
        subscriptions.mark_subscribed("A");

        let subscription = subscriptions.insert("A");

        assert_eq!(subscription.state(), SubscriptionState::Subscribed);
        assert_eq!(subscriptions.len(), 1);
    }

    #[test]
    fn mark_subscribed_ignores_unknown_phones() {
        let mut subscriptions = SubscriptionSet::default();

        assert!(!subscriptions.mark_subscribed("A"));
        assert!(subscriptions.is_empty());
    }

    #[test]
    fn drain_empties_the_set() {
        let mut subscriptions = SubscriptionSet::default();
        subscriptions.insert("A");
        subscriptions.insert("B");

        let drained = subscriptions.drain().map(|(phone_id, _)| phone_id).collect::<BTreeSet<_>>();

        assert_eq!(drained, set_of(&["A", "B"]));
        assert!(subscriptions.is_empty());
    }
}
