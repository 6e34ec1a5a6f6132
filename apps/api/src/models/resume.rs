use serde::{Deserialize, Serialize};

/// Structured resume record as supplied by callers (wire format is camelCase JSON).
///
/// Optional fields are nullable; `isPresent` is mandatory on every dated entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredResume {
    pub basic_info: BasicInfo,
    pub education: Vec<EducationItem>,
    pub experience: Vec<ExperienceItem>,
    pub projects: Vec<ProjectItem>,
    pub skills: Skills,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationItem {
    /// Caller-side identifier; carried through but never rendered.
    #[serde(default)]
    pub id: Option<String>,
    pub institution: String,
    pub location: String,
    pub degree: String,
    #[serde(default)]
    pub minor: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    pub is_present: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceItem {
    #[serde(default)]
    pub id: Option<String>,
    pub organization: String,
    pub job_title: String,
    pub location: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    pub is_present: bool,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectItem {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub technologies: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    pub is_present: bool,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skills {
    pub languages: String,
    pub frameworks: String,
    pub developer_tools: String,
    pub libraries: String,
}

/// Common view over entries that carry a date range.
pub trait DatedEntry {
    fn start_date(&self) -> &str;
    fn end_date(&self) -> Option<&str>;
    fn is_present(&self) -> bool;
}

macro_rules! impl_dated_entry {
    ($($ty:ty),*) => {
        $(
            impl DatedEntry for $ty {
                fn start_date(&self) -> &str {
                    &self.start_date
                }

                fn end_date(&self) -> Option<&str> {
                    self.end_date.as_deref()
                }

                fn is_present(&self) -> bool {
                    self.is_present
                }
            }
        )*
    };
}

impl_dated_entry!(EducationItem, ExperienceItem, ProjectItem);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_camel_case_wire_format() {
        let json = serde_json::json!({
            "basicInfo": {
                "fullName": "Jane Smith",
                "phone": "555-0100",
                "email": "jane@example.com",
                "linkedin": null,
                "github": "https://github.com/jane"
            },
            "education": [],
            "experience": [{
                "id": "exp-1",
                "organization": "Acme",
                "jobTitle": "Engineer",
                "location": "Remote",
                "startDate": "2021-03-01",
                "endDate": null,
                "isPresent": true,
                "description": ["Improved performance by 35%"]
            }],
            "projects": [],
            "skills": {
                "languages": "Rust",
                "frameworks": "",
                "developerTools": "git",
                "libraries": ""
            }
        });

        let resume: StructuredResume = serde_json::from_value(json).unwrap();
        assert_eq!(resume.basic_info.full_name, "Jane Smith");
        assert!(resume.basic_info.linkedin.is_none());
        assert!(resume.basic_info.website.is_none());
        assert_eq!(resume.experience[0].job_title, "Engineer");
        assert!(resume.experience[0].is_present());
        assert_eq!(resume.skills.developer_tools, "git");
    }

    #[test]
    fn test_missing_is_present_is_rejected() {
        let json = serde_json::json!({
            "id": "edu-1",
            "institution": "State University",
            "location": "Springfield",
            "degree": "BSc",
            "startDate": "2015-09",
            "endDate": "2019-06"
        });
        let result: Result<EducationItem, _> = serde_json::from_value(json);
        assert!(result.is_err(), "isPresent is mandatory on dated entries");
    }
}
