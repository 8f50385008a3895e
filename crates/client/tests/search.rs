mod common;

use common::*;
use prodent_client::remote::{Filter, Table};
use prodent_client::{ClientAccess, DebouncedSearch, GuardFailure, SessionConfig};

fn searched_term(call: &Call) -> Option<String> {
    let Call::Select(query) = call else {
        return None;
    };
    query.filters.iter().find_map(|f| match f {
        Filter::Or(inner) => inner.iter().find_map(|f| match f {
            Filter::Contains(_, term) => Some(term.clone()),
            _ => None,
        }),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn only_the_last_term_in_the_window_is_sent() {
    let remote = FakeRemote::new();
    remote.add_user("a@b.com", "pw", Some(CO_1));
    remote.add_row(Table::Clients, client_row(CO_1, "Abcdef", "Souza"));
    remote.add_row(Table::Clients, client_row(CO_1, "Bruno", "Lima"));
    let store = store(&remote);
    store.sign_in("a@b.com", "pw").await.unwrap();
    remote.clear_calls();

    let search = DebouncedSearch::new(ClientAccess::new(store.clone()), &SessionConfig::default());
    let results = search.subscribe();

    let first = search.search("a");
    let second = search.search("ab");
    let last = search.search("abc");

    assert!(first.is_cancelled());
    assert!(second.is_cancelled());
    assert_eq!(first.join().await, Ok(None));
    assert_eq!(second.join().await, Ok(None));

    let found = last.join().await.unwrap().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_name, "Abcdef");

    let selects = remote.data_calls(Table::Clients);
    assert_eq!(selects.len(), 1);
    assert_eq!(searched_term(&selects[0]).as_deref(), Some("abc"));

    let published = results.borrow();
    assert_eq!(published.term, "abc");
    assert_eq!(published.items.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_search_sends_nothing() {
    let remote = FakeRemote::new();
    remote.add_user("a@b.com", "pw", Some(CO_1));
    let store = store(&remote);
    store.sign_in("a@b.com", "pw").await.unwrap();
    remote.clear_calls();

    let search = DebouncedSearch::new(ClientAccess::new(store.clone()), &SessionConfig::default());
    let task = search.search("ana");
    search.cancel();

    assert_eq!(task.join().await, Ok(None));
    assert!(remote.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn expired_session_surfaces_from_search() {
    let remote = FakeRemote::new();
    remote.add_user("a@b.com", "pw", Some(CO_1));
    let store = store(&remote);
    store.sign_in("a@b.com", "pw").await.unwrap();
    remote.revoke_tokens();

    let search = DebouncedSearch::new(ClientAccess::new(store.clone()), &SessionConfig::default());
    let result = search.search("ana").join().await;

    assert_eq!(result, Err(GuardFailure::SessionExpired));
    assert!(store.current_state().user.is_none());
}
