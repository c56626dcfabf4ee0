// src/schedules/regions.rs
//! Exam-center regions and the region-group names used on published schedule images

/// An exam-center region as listed by the exam registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub code: &'static str,
    pub name: &'static str,
}

/// Every region the registry is crawled for, in crawl order
pub const REGIONS: &[Region] = &[
    Region { code: "01", name: "서울" },
    Region { code: "02", name: "인천" },
    Region { code: "03", name: "제주" },
    Region { code: "04", name: "부산" },
    Region { code: "05", name: "울산" },
    Region { code: "06", name: "대구" },
    Region { code: "07", name: "광주" },
    Region { code: "08", name: "전주" },
    Region { code: "09", name: "대전" },
    Region { code: "10", name: "서산" },
    Region { code: "11", name: "원주" },
    Region { code: "12", name: "강릉" },
    Region { code: "13", name: "춘천" },
];

/// Region groups printed on schedule images, expanded to concrete cities
pub const REGION_GROUPS: &[(&str, &[&str])] = &[
    ("수도권", &["서울", "인천", "제주"]),
    ("영남", &["부산", "울산"]),
    ("대구", &["대구"]),
    ("호남", &["광주", "전주"]),
    ("중부", &["대전", "서산"]),
    ("원주", &["원주", "강릉", "춘천"]),
];

pub fn all_regions() -> &'static [Region] {
    REGIONS
}

pub fn region_by_code(code: &str) -> Option<&'static Region> {
    let code = code.trim();
    REGIONS.iter().find(|r| r.code == code)
}

pub fn region_by_name(name: &str) -> Option<&'static Region> {
    let name = name.trim();
    REGIONS.iter().find(|r| r.name == name)
}

/// Cities covered by a region-group name, if it is one
pub fn group_members(group: &str) -> Option<&'static [&'static str]> {
    let group = group.trim();
    REGION_GROUPS
        .iter()
        .find(|(name, _)| *name == group)
        .map(|(_, members)| *members)
}

/// Expands region-group names to their cities; other names pass through.
/// Duplicates are removed, keeping the first occurrence.
pub fn expand_locations(locations: &[String]) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();

    for location in locations {
        let location = location.trim();
        if location.is_empty() {
            continue;
        }

        match group_members(location) {
            Some(members) => {
                for member in members {
                    if !expanded.iter().any(|l| l == *member) {
                        expanded.push((*member).to_string());
                    }
                }
            }
            None => {
                if !expanded.iter().any(|l| l == location) {
                    expanded.push(location.to_string());
                }
            }
        }
    }

    expanded
}
