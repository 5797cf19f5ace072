use super::*;
use pretty_assertions::assert_eq;

fn info(host: &str, owner: &str, repo: &str) -> RepoInfo {
    RepoInfo {
        host: host.to_string(),
        owner: owner.to_string(),
        repo: repo.to_string(),
        raw_url: String::new(),
    }
}

#[test]
fn test_parse_https_url() {
    let parsed = RepoInfo::parse("https://github.com/myorg/myrepo").unwrap();
    assert_eq!(parsed, info("github.com", "myorg", "myrepo"));
}

#[test]
fn test_parse_https_url_with_git_suffix_and_trailing_slash() {
    let parsed = RepoInfo::parse("https://github.com/myorg/myrepo.git/").unwrap();
    assert_eq!(parsed, info("github.com", "myorg", "myrepo"));
}

#[test]
fn test_parse_http_scheme() {
    let parsed = RepoInfo::parse("http://ghe.example.com/team/tool").unwrap();
    assert_eq!(parsed, info("ghe.example.com", "team", "tool"));
}

#[test]
fn test_parse_ssh_form() {
    let parsed = RepoInfo::parse("git@github.com:myorg/myrepo.git").unwrap();
    assert_eq!(parsed, info("github.com", "myorg", "myrepo"));
}

#[test]
fn test_parse_bare_path() {
    let parsed = RepoInfo::parse("github.com/myorg/myrepo").unwrap();
    assert_eq!(parsed, info("github.com", "myorg", "myrepo"));
}

#[test]
fn test_parse_host_only() {
    let parsed = RepoInfo::parse("github.com").unwrap();
    assert!(parsed.is_host_only());
    assert_eq!(parsed.fullpath(), "github.com");
    assert_eq!(parsed.owner, "");
    assert_eq!(parsed.repo, "");
}

#[test]
fn test_parse_deep_path_joins_tail_into_repo() {
    let parsed = RepoInfo::parse("ghe.example.com/org/group/project").unwrap();
    assert_eq!(parsed.owner, "org");
    assert_eq!(parsed.repo, "group/project");
    assert_eq!(parsed.fullpath(), "ghe.example.com/org/group/project");
}

#[test]
fn test_parse_owner_only() {
    let parsed = RepoInfo::parse("github.com/myorg").unwrap();
    assert!(!parsed.is_host_only());
    assert_eq!(parsed.owner, "myorg");
    assert_eq!(parsed.repo, "");
    assert_eq!(parsed.fullpath(), "github.com/myorg");
}

#[test]
fn test_parse_rejects_empty() {
    assert!(RepoInfo::parse("").is_err());
    assert!(RepoInfo::parse("   ").is_err());
    assert!(RepoInfo::parse("https://").is_err());
}

#[test]
fn test_parse_rejects_whitespace_host() {
    assert!(RepoInfo::parse("git hub.com/org/repo").is_err());
}

#[test]
fn test_from_parts() {
    let parsed = RepoInfo::from_parts("github.com", "myorg/myrepo").unwrap();
    assert_eq!(parsed, info("github.com", "myorg", "myrepo"));
}

#[test]
fn test_from_parts_strips_path_decorations() {
    let parsed = RepoInfo::from_parts("github.com", "/myorg/myrepo.git").unwrap();
    assert_eq!(parsed, info("github.com", "myorg", "myrepo"));
}

#[test]
fn test_from_parts_empty_path_is_host_only() {
    let parsed = RepoInfo::from_parts("github.com", "").unwrap();
    assert!(parsed.is_host_only());
}

#[test]
fn test_from_parts_rejects_empty_host() {
    assert!(RepoInfo::from_parts("", "org/repo").is_err());
}

#[test]
fn test_render_parse_round_trip() {
    for reference in [
        "github.com/myorg/myrepo",
        "github.com/myorg",
        "github.com",
        "ghe.example.com/org/group/project",
    ] {
        let parsed = RepoInfo::parse(reference).unwrap();
        let reparsed = RepoInfo::parse(&parsed.render()).unwrap();
        assert_eq!(parsed, reparsed);
    }
}
